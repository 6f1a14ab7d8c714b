//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod server;

pub use server::*;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Longest token lifetime accepted from any settings source (30 days).
pub const MAX_TOKEN_TTL_SECS: u64 = 30 * 24 * 3600;

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 3074, "corsOrigin": "http://localhost:8204" },
///   "auth": { "jwtSecret": "change-me" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// HTTP and WebSocket server settings.
    pub server: ServerSettings,
    /// Token signing settings.
    pub auth: AuthSettings,
    /// Credential store location.
    pub database: DatabaseSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be > 0".into(),
            ));
        }
        if self.server.static_dir.is_some() && self.server.static_port == 0 {
            return Err(SettingsError::InvalidValue(
                "server.staticPort must be set when staticDir is configured".into(),
            ));
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "auth.tokenTtlSecs must be > 0".into(),
            ));
        }
        if self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(SettingsError::InvalidValue(format!(
                "auth.tokenTtlSecs must be <= {MAX_TOKEN_TTL_SECS}"
            )));
        }
        if self.auth.jwt_secret.as_deref() == Some("") {
            return Err(SettingsError::InvalidValue(
                "auth.jwtSecret must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Token signing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for token signatures. When unset a random per-process
    /// secret is generated and tokens do not survive a restart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 3600,
        }
    }
}

/// Credential store location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: crate::loader::tether_home().join("tether.db"),
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`). `RUST_LOG` takes precedence.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Per-module level overrides, e.g. `{"tether_server": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            modules: BTreeMap::new(),
        }
    }
}
