//! # tether-logging
//!
//! Structured logging with `tracing`.
//!
//! [`init_logging`] installs a global subscriber once at startup: an
//! `EnvFilter` built from `RUST_LOG` (or the configured level plus
//! per-module overrides) and a JSON or pretty `fmt` layer on stdout.

#![deny(unsafe_code)]

use tether_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The configured filter directive did not parse.
    #[error("invalid log filter '{directive}': {reason}")]
    Filter {
        /// The directive string that failed.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Build the filter directive string from settings, e.g.
/// `info,tether_server=debug`.
pub fn filter_directive(settings: &LoggingSettings) -> String {
    let mut directive = settings.level.to_lowercase();
    for (module, level) in &settings.modules {
        directive.push(',');
        directive.push_str(module);
        directive.push('=');
        directive.push_str(&level.to_lowercase());
    }
    directive
}

/// Resolve the filter: `RUST_LOG` when set and valid, else the settings.
fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = filter_directive(settings);
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::Filter {
        directive,
        reason: e.to_string(),
    })
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(settings)?;

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
