//! # tether-core
//!
//! Shared domain types for the tether session service.
//!
//! - [`ids`]: branded identifiers (`Identity`, `ConnectionId`)
//! - [`account`]: the account record pushed to authenticated channels
//! - [`messages`]: server → client push envelope
//! - [`credentials`]: the `CredentialStore` contract consumed by auth and server

#![deny(unsafe_code)]

pub mod account;
pub mod credentials;
pub mod ids;
pub mod messages;

pub use account::Account;
pub use credentials::{CredentialError, CredentialStore};
pub use ids::{ConnectionId, Identity};
pub use messages::ServerMessage;
