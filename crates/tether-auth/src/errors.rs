//! Auth error types.

use tether_core::CredentialError;

/// Token construction or verification failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Not a well-formed token (bad encoding, missing claims, wrong algorithm).
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Signature did not verify against the server secret.
    #[error("token signature invalid")]
    BadSignature,
    /// The expiry time has passed.
    #[error("token expired")]
    Expired,
    /// Signing failed while issuing.
    #[error("token signing failed: {0}")]
    Signing(String),
}

impl TokenError {
    /// Whether this is a verification rejection (malformed, bad signature,
    /// expired) rather than a server-side failure.
    pub fn is_invalid(&self) -> bool {
        !matches!(self, Self::Signing(_))
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::BadSignature,
            _ => Self::Malformed(e.to_string()),
        }
    }
}

/// Credential exchange failure.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// No account matched the identity and secret.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The credential store could not answer.
    #[error(transparent)]
    Store(#[from] CredentialError),
    /// The token could not be issued.
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_kinds() {
        assert!(TokenError::Expired.is_invalid());
        assert!(TokenError::BadSignature.is_invalid());
        assert!(TokenError::Malformed("x".into()).is_invalid());
        assert!(!TokenError::Signing("x".into()).is_invalid());
    }

    #[test]
    fn expired_display() {
        assert_eq!(TokenError::Expired.to_string(), "token expired");
    }

    #[test]
    fn store_error_is_transparent() {
        let err = ExchangeError::from(CredentialError::Unavailable("down".into()));
        assert_eq!(err.to_string(), "credential store unavailable: down");
    }

    #[test]
    fn invalid_credentials_display() {
        assert_eq!(ExchangeError::InvalidCredentials.to_string(), "invalid credentials");
    }
}
