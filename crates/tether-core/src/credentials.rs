//! Credential store contract.
//!
//! Both lookups are round-trips to durable storage. `Ok(None)` means the
//! account does not exist (or the secret did not match); `Err` means the
//! store could not answer.

use async_trait::async_trait;

use crate::account::Account;
use crate::ids::Identity;

/// Failure to reach or read the credential store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// Storage is unreachable or the query failed.
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be decoded.
    #[error("corrupt account row: {0}")]
    Corrupt(String),
}

/// Lookup operations over stored accounts.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the account whose identity and secret both match.
    async fn find_by_credentials(
        &self,
        identity: &Identity,
        secret: &str,
    ) -> Result<Option<Account>, CredentialError>;

    /// Find the account for an identity.
    async fn find_by_identity(&self, identity: &Identity) -> Result<Option<Account>, CredentialError>;
}
