//! # tether-auth
//!
//! Token issuing/verification and the credential exchange.
//!
//! - [`token`]: HS256 tokens binding an identity to a fixed expiry window
//! - [`exchange`]: identity + secret → token, via a [`tether_core::CredentialStore`]

#![deny(unsafe_code)]

pub mod errors;
pub mod exchange;
pub mod token;

pub use errors::{ExchangeError, TokenError};
pub use exchange::exchange;
pub use token::{Claims, DEFAULT_TOKEN_TTL, IssuedToken, TokenIssuer, generate_secret};
