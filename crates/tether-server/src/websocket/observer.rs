//! Channel lifecycle hooks.

use tether_core::Identity;
use tracing::{debug, info, warn};

use super::channel::Channel;
use super::handshake::{PushError, PushOutcome, RejectReason};
use crate::metrics::{
    PUSH_FAILURES_TOTAL, PUSH_TOTAL, WS_AUTHENTICATED_TOTAL, WS_REJECTIONS_TOTAL,
    WS_SUPERSEDED_TOTAL,
};

/// Notified as channels move through the handshake.
///
/// Every method defaults to a no-op.
pub trait LifecycleObserver: Send + Sync {
    /// The channel was rejected and terminated.
    fn on_rejected(&self, _channel: &Channel, _reason: &RejectReason) {}

    /// The channel was bound to `identity`.
    fn on_authenticated(&self, _channel: &Channel, _identity: &Identity) {}

    /// `previous` lost its registry entry to `current`. It stays open.
    fn on_superseded(&self, _identity: &Identity, _previous: &Channel, _current: &Channel) {}

    /// The initial push finished.
    fn on_pushed(&self, _channel: &Channel, _identity: &Identity, _outcome: PushOutcome) {}

    /// The initial push could not be produced.
    fn on_push_failed(&self, _channel: &Channel, _identity: &Identity, _error: &PushError) {}

    /// Transport closed. `was_registered` is true if this channel still
    /// held its registry entry.
    fn on_closed(&self, _channel: &Channel, _was_registered: bool) {}
}

/// Logs lifecycle events and records metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl LifecycleObserver for TracingObserver {
    fn on_rejected(&self, channel: &Channel, reason: &RejectReason) {
        match reason {
            RejectReason::MissingToken => {
                debug!(conn_id = %channel.id(), "channel rejected: no token");
            }
            RejectReason::InvalidToken(e) => {
                debug!(conn_id = %channel.id(), error = %e, "channel rejected: invalid token");
            }
        }
        metrics::counter!(WS_REJECTIONS_TOTAL, "reason" => reason.label()).increment(1);
    }

    fn on_authenticated(&self, channel: &Channel, identity: &Identity) {
        info!(conn_id = %channel.id(), identity = %identity, "channel authenticated");
        metrics::counter!(WS_AUTHENTICATED_TOTAL).increment(1);
    }

    fn on_superseded(&self, identity: &Identity, previous: &Channel, current: &Channel) {
        info!(
            identity = %identity,
            previous = %previous.id(),
            current = %current.id(),
            "registry entry superseded"
        );
        metrics::counter!(WS_SUPERSEDED_TOTAL).increment(1);
    }

    fn on_pushed(&self, channel: &Channel, identity: &Identity, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Sent => debug!(conn_id = %channel.id(), "initial push sent"),
            PushOutcome::AccountNotFound => {
                warn!(conn_id = %channel.id(), identity = %identity, "no account for verified identity");
            }
            PushOutcome::ChannelClosed => {
                debug!(conn_id = %channel.id(), "channel closed before push");
            }
            PushOutcome::Dropped => {
                warn!(conn_id = %channel.id(), "initial push dropped, send queue full");
            }
        }
        metrics::counter!(PUSH_TOTAL, "outcome" => outcome.label()).increment(1);
    }

    fn on_push_failed(&self, channel: &Channel, identity: &Identity, error: &PushError) {
        warn!(conn_id = %channel.id(), identity = %identity, error = %error, "initial push failed");
        metrics::counter!(PUSH_FAILURES_TOTAL).increment(1);
    }

    fn on_closed(&self, channel: &Channel, was_registered: bool) {
        debug!(
            conn_id = %channel.id(),
            identity = ?channel.identity(),
            was_registered,
            age_ms = u64::try_from(channel.age().as_millis()).unwrap_or(u64::MAX),
            "channel closed"
        );
    }
}
