//! `WebSocket` channel handling: per-channel state, the identity registry,
//! the authentication handshake and the socket pump.

pub mod channel;
pub mod handler;
pub mod handshake;
pub mod observer;
pub mod registry;
