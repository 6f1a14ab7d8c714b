//! # tether-store
//!
//! `SQLite`-backed credential store.
//!
//! - [`Database`]: shared connection with schema applied on open
//! - [`AccountRepo`]: synchronous account queries and admin inserts
//! - [`SqliteCredentialStore`]: async [`tether_core::CredentialStore`] adapter

#![deny(unsafe_code)]

pub mod accounts;
pub mod credential_store;
pub mod database;
pub mod error;
pub mod schema;

pub use accounts::{AccountRepo, NewAccount};
pub use credential_store::SqliteCredentialStore;
pub use database::Database;
pub use error::StoreError;
