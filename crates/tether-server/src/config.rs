//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use tether_settings::ServerSettings;

use crate::errors::ServerError;

/// Runtime configuration for [`crate::TetherServer`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Max `WebSocket` message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per channel.
    pub send_queue_capacity: usize,
    /// Interval between keep-alive pings.
    pub heartbeat_interval: Duration,
    /// Allowed CORS origin; permissive when `None`.
    pub cors_origin: Option<HeaderValue>,
    /// Static login page directory.
    pub static_dir: Option<PathBuf>,
    /// Port for the static login page listener.
    pub static_port: u16,
    /// Send a 1008 close frame with a reason on rejection.
    pub close_reason_on_reject: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024,
            send_queue_capacity: 32,
            heartbeat_interval: Duration::from_secs(30),
            cors_origin: None,
            static_dir: None,
            static_port: 0,
            close_reason_on_reject: false,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, ServerError> {
        let cors_origin = settings
            .cors_origin
            .as_deref()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| ServerError::Config(format!("cors origin {origin:?}: {e}")))
            })
            .transpose()?;

        Ok(Self {
            host: settings.host.clone(),
            port: settings.port,
            max_message_size: settings.max_message_size,
            send_queue_capacity: settings.send_queue_capacity.max(1),
            heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs.max(1)),
            cors_origin,
            static_dir: settings.static_dir.as_ref().map(PathBuf::from),
            static_port: settings.static_port,
            close_reason_on_reject: settings.close_reason_on_reject,
        })
    }

    /// `host:port` for the API listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
