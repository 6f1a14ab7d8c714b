//! `tether serve`: build the server from settings and run until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tether_auth::{TokenIssuer, generate_secret};
use tether_server::{ServerConfig, TetherServer};
use tether_settings::{AuthSettings, LoadedSettings, TetherSettings};
use tether_store::{Database, SqliteCredentialStore};
use tracing::{info, warn};

use crate::ServeArgs;

fn apply_serve_args(settings: &mut TetherSettings, args: &ServeArgs) {
    if let Some(host) = &args.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
}

/// Configured secret, or a random one that dies with the process.
fn resolve_secret(auth: &AuthSettings) -> String {
    if let Some(secret) = &auth.jwt_secret {
        return secret.clone();
    }
    warn!("no jwt secret configured; tokens will not survive a restart");
    generate_secret()
}

fn build_server(settings: &TetherSettings) -> Result<TetherServer> {
    let db_path = &settings.database.path;
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let store = Arc::new(SqliteCredentialStore::new(db));

    let secret = resolve_secret(&settings.auth);
    let issuer = Arc::new(TokenIssuer::new(
        secret.as_bytes(),
        Duration::from_secs(settings.auth.token_ttl_secs),
    ));

    let config = ServerConfig::from_settings(&settings.server)?;
    Ok(TetherServer::new(config, store, issuer))
}

pub(crate) async fn run(loaded: LoadedSettings, args: &ServeArgs) -> Result<()> {
    let LoadedSettings {
        mut settings,
        ignored,
    } = loaded;
    apply_serve_args(&mut settings, args);
    tether_logging::init_logging(&settings.logging).context("Failed to initialise logging")?;
    for skipped in &ignored {
        skipped.log();
    }

    let metrics = tether_server::metrics::install_recorder()?;
    let server = build_server(&settings)?.with_metrics(metrics);

    let addr = server.listen().await.context("Failed to bind server")?;
    if let Some(static_addr) = server
        .listen_static()
        .await
        .context("Failed to bind static page listener")?
    {
        info!(addr = %static_addr, "login page on http://{static_addr}");
    }
    info!(
        db = %settings.database.path.display(),
        "tether listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("Shutting down...");
    server.shutdown().graceful_shutdown(None).await;
    info!("Shutdown complete");
    Ok(())
}
