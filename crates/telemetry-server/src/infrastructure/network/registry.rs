//! The set of live client connections.
//!
//! Every operation takes the one internal lock for its whole duration, so a
//! [`ConnectionRegistry::snapshot`] never sees a half-applied `add` or
//! `remove`.  Snapshots are copies: callers iterate and write without holding
//! the lock, so a slow client cannot stall the acceptor.
//!
//! The listening socket is not stored here.  It belongs to the acceptor, which
//! keeps it out of broadcast iteration and disconnect handling by construction.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::connection::{Connection, ConnectionId};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a connection.  Snapshots list connections in insertion order.
    pub fn add(&self, connection: Arc<Connection>) {
        let mut guard = self.lock();
        debug!("registry add {} ({})", connection.peer(), connection.id());
        guard.push(connection);
    }

    /// Removes the connection with `id`, returning it if it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut guard = self.lock();
        let index = guard.iter().position(|c| c.id() == id)?;
        let removed = guard.remove(index);
        debug!("registry remove {} ({id})", removed.peer());
        Some(removed)
    }

    /// A stable copy of the current membership.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.lock().clone()
    }

    /// Removes and returns every connection.  Used by the shutdown sweep.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        std::mem::take(&mut *self.lock())
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().iter().any(|c| c.id() == id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-modified,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
