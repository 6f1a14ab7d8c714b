//! # tether-server
//!
//! Axum HTTP + `WebSocket` server for authenticated push channels.
//!
//! - `POST /api/login`: credential exchange, returns a signed token
//! - `GET /ws?token=…`: channel open; the handshake verifies the token,
//!   binds the identity in the [`ConnectionRegistry`] and pushes the
//!   account record
//! - `GET /health`, `GET /metrics`
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod login;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, TetherServer};
pub use websocket::channel::{Channel, CloseNotice, Outbound};
pub use websocket::handshake::{
    HandshakeError, HandshakeOutcome, Phase, PushError, PushOutcome, RejectReason, SessionGateway,
};
pub use websocket::observer::{LifecycleObserver, TracingObserver};
pub use websocket::registry::ConnectionRegistry;
