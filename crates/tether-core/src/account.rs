//! Account record.

use serde::{Deserialize, Serialize};

use crate::ids::Identity;

/// One row of the credential store.
///
/// The password is accepted on deserialisation (seed files, admin input)
/// but never serialised, so a pushed account cannot leak it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Row id.
    pub id: i64,
    /// Unique email; doubles as the identity.
    pub email: String,
    /// Credential secret.
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Display name.
    pub name: String,
    /// Role tag.
    pub role: String,
}

impl Account {
    /// The identity this account is keyed by.
    pub fn identity(&self) -> Identity {
        Identity::new(self.email.clone())
    }
}
