//! Identity → channel registry.
//!
//! At most one channel per identity. Registering a second channel for an
//! identity overwrites the entry; the previous channel is left open but is
//! no longer reachable through the registry. Unregistering is keyed on the
//! channel itself, so a stale channel closing never evicts the entry that
//! replaced it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tether_core::{ConnectionId, Identity};

use super::channel::Channel;

#[derive(Default)]
struct Inner {
    by_identity: HashMap<Identity, Arc<Channel>>,
    by_connection: HashMap<ConnectionId, Identity>,
}

/// Shared map from identity to its current channel.
///
/// Both indexes live behind one lock so register and unregister are atomic
/// with respect to each other.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `channel`, replacing any existing binding.
    ///
    /// Returns the displaced channel, if it was a different one.
    pub fn register(&self, identity: Identity, channel: Arc<Channel>) -> Option<Arc<Channel>> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let conn_id = channel.id().clone();

        // A channel is filed under one identity at most.
        if let Some(old_identity) = inner.by_connection.remove(&conn_id) {
            if old_identity != identity {
                let _ = inner.by_identity.remove(&old_identity);
            }
        }

        let displaced = inner.by_identity.insert(identity.clone(), channel);
        let _ = inner.by_connection.insert(conn_id.clone(), identity);

        match displaced {
            Some(prev) if *prev.id() != conn_id => {
                let _ = inner.by_connection.remove(prev.id());
                Some(prev)
            }
            _ => None,
        }
    }

    /// Remove every entry whose channel is `channel`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, channel: &Channel) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let Some(identity) = inner.by_connection.remove(channel.id()) else {
            return false;
        };
        if inner
            .by_identity
            .get(&identity)
            .is_some_and(|current| current.id() == channel.id())
        {
            let _ = inner.by_identity.remove(&identity);
        }
        true
    }

    /// Channel currently bound to `identity`.
    pub fn lookup(&self, identity: &Identity) -> Option<Arc<Channel>> {
        self.inner.read().by_identity.get(identity).cloned()
    }

    /// Identity `channel` is filed under, if any.
    pub fn identity_of(&self, conn_id: &ConnectionId) -> Option<Identity> {
        self.inner.read().by_connection.get(conn_id).cloned()
    }

    /// Number of bound identities.
    pub fn len(&self) -> usize {
        self.inner.read().by_identity.len()
    }

    /// Whether no identity is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bound identities, sorted.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.inner.read().by_identity.keys().cloned().collect();
        ids.sort();
        ids
    }
}
