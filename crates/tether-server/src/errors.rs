//! Server error types.

/// Errors raised while configuring or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A configuration value could not be used.
    #[error("invalid server config: {0}")]
    Config(String),
    /// Binding a listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// The Prometheus recorder could not be installed.
    #[error("metrics recorder: {0}")]
    Metrics(String),
}
