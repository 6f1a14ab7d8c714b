//! Server network settings.

use serde::{Deserialize, Serialize};

/// HTTP + WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// API + WebSocket port.
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per channel.
    pub send_queue_capacity: usize,
    /// WebSocket ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Allowed CORS origin. Permissive when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origin: Option<String>,
    /// Directory holding the static login page. Not served when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
    /// Port for the static login page listener.
    pub static_port: u16,
    /// Send a 1008 close frame with a reason when a channel is rejected.
    pub close_reason_on_reject: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3074,
            max_message_size: 64 * 1024,
            send_queue_capacity: 32,
            heartbeat_interval_secs: 30,
            cors_origin: None,
            static_dir: None,
            static_port: 8204,
            close_reason_on_reject: false,
        }
    }
}
