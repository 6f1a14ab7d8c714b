//! Store error types.

use tether_core::CredentialError;

/// Errors raised by the credential database.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `SQLite` returned an error.
    #[error("database error: {0}")]
    Database(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table name.
        table: &'static str,
        /// Column name.
        column: &'static str,
        /// Decoder message.
        detail: String,
    },

    /// Filesystem failure while opening.
    #[error("IO error: {0}")]
    Io(String),

    /// The blocking worker was cancelled or panicked.
    #[error("store task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, ref msg) = e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return StoreError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()));
            }
        }
        StoreError::Database(e.to_string())
    }
}

impl From<StoreError> for CredentialError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CorruptRow { .. } => CredentialError::Corrupt(e.to_string()),
            other => CredentialError::Unavailable(other.to_string()),
        }
    }
}
