//! Signed, time-limited tokens.
//!
//! A token is an HS256 JWT carrying `{email, iat, exp}`. Verification is a
//! pure signature check plus a clock comparison; nothing is persisted and
//! there is no revocation.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tether_core::Identity;
use tracing::debug;

use crate::errors::TokenError;

/// Default token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity the token was issued to.
    pub email: String,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
}

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Encoded token string.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies tokens with one shared secret.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer for `secret` with the given lifetime.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Valid up to and including `exp`, never after.
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Token lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `identity`, valid from now for the configured ttl.
    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, TokenError> {
        self.issue_at(identity, Utc::now())
    }

    /// Issue a token as if at `issued_at`.
    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| TokenError::Signing(format!("ttl out of range: {e}")))?;
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing("expiry out of range".into()))?;
        let claims = Claims {
            email: identity.as_str().to_owned(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(identity = %identity, exp = claims.exp, "token issued");
        Ok(IssuedToken { token, expires_at })
    }

    /// Verify `token` and return the identity it was issued to.
    pub fn verify(&self, token: &str) -> Result<Identity, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        if data.claims.email.is_empty() {
            return Err(TokenError::Malformed("empty identity claim".into()));
        }
        Ok(Identity::new(data.claims.email))
    }
}

/// Generate a random 256-bit secret, URL-safe base64 encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", DEFAULT_TOKEN_TTL)
    }

    fn ann() -> Identity {
        Identity::from("ann@example.com")
    }

    #[test]
    fn verify_returns_issued_identity() {
        let issuer = issuer();
        let issued = issuer.issue(&ann()).unwrap();
        assert_eq!(issuer.verify(&issued.token).unwrap(), ann());
    }

    #[test]
    fn expiry_is_one_hour_after_issue() {
        let now = Utc::now();
        let issued = issuer().issue_at(&ann(), now).unwrap();
        assert_eq!((issued.expires_at - now).num_seconds(), 3600);
    }

    #[test]
    fn huge_ttl_is_signing_error() {
        let issuer = TokenIssuer::new(b"s", Duration::from_secs(9_000_000_000_000));
        assert_matches!(issuer.issue(&ann()), Err(TokenError::Signing(_)));
    }

    #[test]
    fn still_valid_just_before_expiry() {
        let issuer = issuer();
        let issued_at = Utc::now() - chrono::Duration::minutes(59);
        let issued = issuer.issue_at(&ann(), issued_at).unwrap();
        assert_eq!(issuer.verify(&issued.token).unwrap(), ann());
    }

    #[test]
    fn expired_token_rejected() {
        let issuer = issuer();
        let issued_at = Utc::now() - chrono::Duration::hours(2);
        let issued = issuer.issue_at(&ann(), issued_at).unwrap();
        assert_matches!(issuer.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn token_past_expiry_by_seconds_rejected() {
        let issuer = issuer();
        let issued_at = Utc::now() - chrono::Duration::seconds(3605);
        let issued = issuer.issue_at(&ann(), issued_at).unwrap();
        assert_matches!(issuer.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn other_secret_rejected() {
        let issued = TokenIssuer::new(b"other", DEFAULT_TOKEN_TTL)
            .issue(&ann())
            .unwrap();
        assert_matches!(issuer().verify(&issued.token), Err(TokenError::BadSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        assert_matches!(issuer().verify("not-a-token"), Err(TokenError::Malformed(_)));
        assert_matches!(issuer().verify(""), Err(TokenError::Malformed(_)));
    }

    #[test]
    fn tampered_payload_rejected() {
        let issuer = issuer();
        let issued = issuer.issue(&ann()).unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&serde_json::json!({
                "email": "mallory@example.com",
                "iat": 0,
                "exp": i64::MAX / 2,
            }))
            .unwrap(),
        );
        parts[1] = &forged;
        let err = issuer.verify(&parts.join(".")).unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn empty_identity_claim_rejected() {
        let issuer = issuer();
        let issued = issuer.issue(&Identity::from("")).unwrap();
        assert_matches!(issuer.verify(&issued.token), Err(TokenError::Malformed(_)));
    }

    #[test]
    fn claims_use_email_field() {
        let issued = issuer().issue(&ann()).unwrap();
        let payload = issued.token.split('.').nth(1).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims["email"], "ann@example.com");
        assert!(claims["iat"].is_number());
        assert!(claims["exp"].is_number());
    }

    #[test]
    fn debug_hides_secret() {
        let debug = format!("{:?}", TokenIssuer::new(b"hunter2", DEFAULT_TOKEN_TTL));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn generated_secrets_differ() {
        let a = generate_secret();
        assert_eq!(a.len(), 43);
        assert_ne!(a, generate_secret());
    }

    proptest! {
        #[test]
        fn roundtrip_any_identity(local in "[a-z0-9._]{1,24}", domain in "[a-z]{1,12}\\.[a-z]{2,4}") {
            let issuer = issuer();
            let identity = Identity::new(format!("{local}@{domain}"));
            let issued = issuer.issue(&identity).unwrap();
            prop_assert_eq!(issuer.verify(&issued.token).unwrap(), identity);
        }
    }
}
