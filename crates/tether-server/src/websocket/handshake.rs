//! Channel handshake: token verification, identity binding and the
//! initial account push.
//!
//! ```text
//! OPENED ──token absent──────────────▶ REJECTED
//! OPENED ──token present─▶ AUTHENTICATING ──verify fails─▶ REJECTED
//!                          AUTHENTICATING ──verify ok────▶ AUTHENTICATED
//! any non-terminal ──transport close─▶ CLOSED
//! ```
//!
//! Verification runs inline on the connection task. The account lookup for
//! the push runs on its own task after the identity is registered.

use std::sync::Arc;

use serde::Serialize;
use tether_auth::{TokenError, TokenIssuer};
use tether_core::{CredentialError, CredentialStore, Identity, ServerMessage};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::channel::{Channel, CloseNotice};
use super::observer::LifecycleObserver;
use super::registry::ConnectionRegistry;

/// Handshake phase of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Transport up, nothing checked yet.
    Opened,
    /// Token is being verified.
    Authenticating,
    /// Identity bound and registered.
    Authenticated,
    /// Token missing or invalid; terminal.
    Rejected,
    /// Transport gone; terminal.
    Closed,
}

impl Phase {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::{Authenticated, Authenticating, Closed, Opened, Rejected};
        matches!(
            (self, next),
            (Opened, Authenticating | Rejected | Closed)
                | (Authenticating, Authenticated | Rejected | Closed)
                | (Authenticated, Closed)
        )
    }

    /// Rejected and Closed accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Rejected | Phase::Closed)
    }
}

/// Why a channel was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// No token, or an empty one.
    MissingToken,
    /// Verification failed.
    InvalidToken(TokenError),
}

impl RejectReason {
    /// Reason string for the close frame.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing token",
            Self::InvalidToken(_) => "invalid token",
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken(TokenError::Expired) => "expired",
            Self::InvalidToken(TokenError::BadSignature) => "bad_signature",
            Self::InvalidToken(_) => "malformed",
        }
    }
}

/// Errors from driving the state machine out of order.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// The channel cannot move from `from` to `to`.
    #[error("invalid handshake transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Phase the channel was in.
        from: Phase,
        /// Phase that was requested.
        to: Phase,
    },
}

/// What happened to the initial push.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    /// The account record was queued on the channel.
    Sent,
    /// No account exists for the identity; nothing was sent.
    AccountNotFound,
    /// The channel closed before the lookup completed.
    ChannelClosed,
    /// The channel's send queue was full.
    Dropped,
}

impl PushOutcome {
    /// Short label for metrics.
    pub fn label(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::AccountNotFound => "account_not_found",
            Self::ChannelClosed => "channel_closed",
            Self::Dropped => "dropped",
        }
    }
}

/// The initial push could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The account lookup failed.
    #[error("account lookup failed: {0}")]
    Lookup(#[from] CredentialError),
    /// The account record could not be encoded.
    #[error("encode push payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of [`SessionGateway::open`].
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The channel was terminated.
    Rejected(RejectReason),
    /// The channel is bound to `identity`; `push` resolves once the
    /// account lookup finishes.
    Authenticated {
        /// Verified identity.
        identity: Identity,
        /// Initial push task.
        push: JoinHandle<Result<PushOutcome, PushError>>,
    },
}

/// Drives channels through the handshake.
#[derive(Clone)]
pub struct SessionGateway {
    registry: Arc<ConnectionRegistry>,
    issuer: Arc<TokenIssuer>,
    store: Arc<dyn CredentialStore>,
    observer: Arc<dyn LifecycleObserver>,
    close_reason_on_reject: bool,
}

impl SessionGateway {
    /// Create a gateway.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        issuer: Arc<TokenIssuer>,
        store: Arc<dyn CredentialStore>,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        Self {
            registry,
            issuer,
            store,
            observer,
            close_reason_on_reject: false,
        }
    }

    /// Send a 1008 close frame with a reason when rejecting.
    #[must_use]
    pub fn with_close_reason_on_reject(mut self, enabled: bool) -> Self {
        self.close_reason_on_reject = enabled;
        self
    }

    /// Registry this gateway binds identities in.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Token verifier.
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Credential store used for lookups.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Run the handshake for a freshly opened channel.
    ///
    /// Must be called from within a Tokio runtime: on success the initial
    /// push is spawned.
    #[instrument(skip_all, fields(conn_id = %channel.id()))]
    pub fn open(
        &self,
        channel: &Arc<Channel>,
        token: Option<&str>,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return self.reject(channel, RejectReason::MissingToken);
        };

        let _ = channel.advance(Phase::Authenticating)?;
        let identity = match self.issuer.verify(token) {
            Ok(identity) => identity,
            Err(e) => return self.reject(channel, RejectReason::InvalidToken(e)),
        };

        let _ = channel.advance(Phase::Authenticated)?;
        channel.bind_identity(identity.clone());
        if let Some(previous) = self.registry.register(identity.clone(), Arc::clone(channel)) {
            self.observer.on_superseded(&identity, &previous, channel);
        }
        self.observer.on_authenticated(channel, &identity);

        let gateway = self.clone();
        let push_channel = Arc::clone(channel);
        let push_identity = identity.clone();
        let push = tokio::spawn(async move {
            gateway.push_initial(&push_identity, &push_channel).await
        });

        Ok(HandshakeOutcome::Authenticated { identity, push })
    }

    fn reject(
        &self,
        channel: &Channel,
        reason: RejectReason,
    ) -> Result<HandshakeOutcome, HandshakeError> {
        let _ = channel.advance(Phase::Rejected)?;
        let notice = self
            .close_reason_on_reject
            .then(|| CloseNotice::policy(reason.close_reason()));
        let _ = channel.terminate(notice);
        self.observer.on_rejected(channel, &reason);
        Ok(HandshakeOutcome::Rejected(reason))
    }

    /// Look up the account for `identity` and queue it on `channel`.
    #[instrument(skip_all, fields(conn_id = %channel.id(), identity = %identity))]
    pub async fn push_initial(
        &self,
        identity: &Identity,
        channel: &Channel,
    ) -> Result<PushOutcome, PushError> {
        let result = self.lookup_and_send(identity, channel).await;
        match &result {
            Ok(outcome) => self.observer.on_pushed(channel, identity, *outcome),
            Err(e) => self.observer.on_push_failed(channel, identity, e),
        }
        result
    }

    async fn lookup_and_send(
        &self,
        identity: &Identity,
        channel: &Channel,
    ) -> Result<PushOutcome, PushError> {
        let Some(account) = self.store.find_by_identity(identity).await? else {
            return Ok(PushOutcome::AccountNotFound);
        };
        if channel.is_closed() {
            return Ok(PushOutcome::ChannelClosed);
        }
        let json = ServerMessage::Data(account).to_json()?;
        if channel.send(Arc::new(json)) {
            Ok(PushOutcome::Sent)
        } else if channel.is_closed() {
            Ok(PushOutcome::ChannelClosed)
        } else {
            Ok(PushOutcome::Dropped)
        }
    }

    /// Handle transport close: unregister and mark the channel closed.
    ///
    /// Idempotent. A rejected channel stays `Rejected`.
    #[instrument(skip_all, fields(conn_id = %channel.id()))]
    pub fn close(&self, channel: &Channel) {
        let was_registered = self.registry.unregister(channel);
        channel.mark_closed();
        let phase = channel.phase();
        if phase.can_advance_to(Phase::Closed) {
            let _ = channel.advance(Phase::Closed);
        } else {
            debug!(?phase, "close on terminal channel");
        }
        self.observer.on_closed(channel, was_registered);
    }
}
