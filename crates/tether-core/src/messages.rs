//! Server → client push messages.

use serde::Serialize;

use crate::account::Account;

/// A message pushed over an authenticated channel.
///
/// Wire shape is `{"type": "<kind>", "payload": <value>}`.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The bound user's account record, sent once after authentication.
    Data(Account),
}

impl ServerMessage {
    /// Serialise to the JSON text frame sent over the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
