//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// `WebSocket` transports accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// `WebSocket` transports closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open `WebSocket` transports (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Handshakes rejected (counter, labels: reason).
pub const WS_REJECTIONS_TOTAL: &str = "ws_rejections_total";
/// Handshakes that bound an identity (counter).
pub const WS_AUTHENTICATED_TOTAL: &str = "ws_authenticated_total";
/// Registry entries overwritten by a newer channel (counter).
pub const WS_SUPERSEDED_TOTAL: &str = "ws_superseded_total";
/// Identities bound in the registry (gauge).
pub const REGISTRY_ENTRIES: &str = "registry_entries";
/// Initial pushes by outcome (counter, labels: outcome).
pub const PUSH_TOTAL: &str = "push_total";
/// Initial pushes that failed to look up or encode (counter).
pub const PUSH_FAILURES_TOTAL: &str = "push_failures_total";
/// Login attempts by result (counter, labels: result).
pub const LOGIN_TOTAL: &str = "login_total";
