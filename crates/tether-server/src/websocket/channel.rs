//! Server side of one `WebSocket` connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tether_core::{ConnectionId, Identity};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::handshake::{HandshakeError, Phase};

/// Close code sent when a channel is rejected during the handshake.
pub const POLICY_VIOLATION: u16 = 1008;

/// Close code sent when the server is shutting down.
pub const GOING_AWAY: u16 = 1001;

/// Close frame details queued for the socket writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseNotice {
    /// `WebSocket` close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseNotice {
    /// A 1008 policy-violation close.
    pub fn policy(reason: impl Into<String>) -> Self {
        Self {
            code: POLICY_VIOLATION,
            reason: reason.into(),
        }
    }

    /// A 1001 going-away close.
    pub fn going_away() -> Self {
        Self {
            code: GOING_AWAY,
            reason: "server shutting down".into(),
        }
    }
}

/// Frames queued for the socket writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A text frame.
    Text(Arc<String>),
    /// Close the socket, optionally with a close frame.
    Close(Option<CloseNotice>),
}

/// One connected channel.
///
/// Owns the send side of the writer queue. The writer task drains the
/// queue into the socket, so every method here is non-blocking.
pub struct Channel {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    phase: Mutex<Phase>,
    identity: Mutex<Option<Identity>>,
    closed: AtomicBool,
    hangup: CancellationToken,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl Channel {
    /// Create a channel in the `Opened` phase.
    pub fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self::with_id(ConnectionId::new(), tx)
    }

    /// Create a channel with a known id.
    pub fn with_id(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            tx,
            phase: Mutex::new(Phase::Opened),
            identity: Mutex::new(None),
            closed: AtomicBool::new(false),
            hangup: CancellationToken::new(),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a channel plus the receiver its writer task drains.
    pub fn pair(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(tx)), rx)
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Identity bound by a successful handshake.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.lock().clone()
    }

    pub(crate) fn bind_identity(&self, identity: Identity) {
        *self.identity.lock() = Some(identity);
    }

    /// Current handshake phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Move to `next`, returning the previous phase.
    pub(crate) fn advance(&self, next: Phase) -> Result<Phase, HandshakeError> {
        let mut phase = self.phase.lock();
        let from = *phase;
        if !from.can_advance_to(next) {
            return Err(HandshakeError::InvalidTransition { from, to: next });
        }
        *phase = next;
        Ok(from)
    }

    /// Queue a text frame.
    ///
    /// Returns `false` if the channel is closed or its queue is full; the
    /// latter bumps the dropped counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.tx.try_send(Outbound::Text(message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(conn_id = %self.id, "send queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }

    /// Mark closed and ask the writer to close the socket.
    ///
    /// Returns `false` if the channel was already closed.
    pub fn terminate(&self, notice: Option<CloseNotice>) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.tx.try_send(Outbound::Close(notice)).is_err() {
            // Queue full: the writer picks up the hangup instead.
            self.hangup.cancel();
        }
        true
    }

    /// Resolves once [`Self::terminate`] could not queue its close frame.
    pub(crate) async fn hung_up(&self) {
        self.hangup.cancelled().await;
    }

    /// Record that the transport is gone.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether the channel has been closed or terminated.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Messages dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the transport connected.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("phase", &self.phase())
            .field("identity", &self.identity())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
