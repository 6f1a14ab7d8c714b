//! Credential exchange: identity + secret → token.

use tether_core::{CredentialStore, Identity};
use tracing::{info, instrument, warn};

use crate::errors::ExchangeError;
use crate::token::{IssuedToken, TokenIssuer};

/// Look up the account by credentials and, on a match, issue a token for
/// the stored identity.
#[instrument(skip_all, fields(identity = %identity))]
pub async fn exchange(
    store: &dyn CredentialStore,
    issuer: &TokenIssuer,
    identity: &Identity,
    secret: &str,
) -> Result<IssuedToken, ExchangeError> {
    let account = match store.find_by_credentials(identity, secret).await {
        Ok(Some(account)) => account,
        Ok(None) => {
            info!("credential exchange rejected");
            return Err(ExchangeError::InvalidCredentials);
        }
        Err(e) => {
            warn!(error = %e, "credential lookup failed");
            return Err(e.into());
        }
    };

    let issued = issuer.issue(&account.identity())?;
    info!(expires_at = %issued.expires_at, "credential exchange succeeded");
    Ok(issued)
}
