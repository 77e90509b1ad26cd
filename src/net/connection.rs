//! Client connection tracking.
//!
//! # Responsibilities
//! - Track which proxy-side client connections have talked to this process
//! - Forget a connection when the proxy reports its disconnect
//! - Prune connections idle for longer than a deadline (housekeeping)

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A client connection as the proxy names it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub sender: String,
    pub conn_id: String,
}

impl ClientKey {
    pub fn new(sender: impl Into<String>, conn_id: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            conn_id: conn_id.into(),
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.sender, self.conn_id)
    }
}

/// What is known about one client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConnection {
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub requests: u64,
}

/// Shared table of live client connections. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    clients: Arc<Mutex<HashMap<ClientKey, ClientConnection>>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request from `key`.
    pub fn touch(&self, key: ClientKey) {
        let now = Instant::now();
        self.lock()
            .entry(key)
            .and_modify(|c| {
                c.last_seen = now;
                c.requests += 1;
            })
            .or_insert(ClientConnection {
                first_seen: now,
                last_seen: now,
                requests: 1,
            });
    }

    /// Forget `key`, returning what was known about it.
    pub fn close(&self, key: &ClientKey) -> Option<ClientConnection> {
        let closed = self.lock().remove(key);
        if closed.is_some() {
            tracing::trace!(client = %key, "Client connection closed");
        }
        closed
    }

    pub fn get(&self, key: &ClientKey) -> Option<ClientConnection> {
        self.lock().get(key).copied()
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop connections not seen within `max_idle`. Returns how many were dropped.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, c| now.duration_since(c.last_seen) <= max_idle);
        before - clients.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientKey, ClientConnection>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
