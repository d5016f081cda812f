//! Connection entry types
//!
//! This module defines the per-connection state stored in the registry.

use std::fmt;
use std::sync::Arc;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::history::UserKey;

/// Identifier of one live connection, supplied by the client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new connection id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of one particular registration
///
/// Re-registering the same id bumps the generation, so a session that
/// outlived its registration cannot remove the newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTicket {
    /// Registered connection id
    pub connection_id: ConnectionId,
    /// Registration generation
    pub generation: u64,
}

/// Entry for a single connection in the registry
pub struct ConnectionEntry<T> {
    /// Owning user
    pub user_key: UserKey,

    /// Transport handle, released on removal
    pub(super) transport: Arc<T>,

    /// Last heartbeat received (or registration time)
    pub last_heartbeat: Instant,

    /// Registration generation
    pub generation: u64,

    /// When the connection was registered
    pub registered_at: Instant,

    /// Handle of this connection's heartbeat monitor
    pub(super) monitor: Option<AbortHandle>,
}

impl<T> ConnectionEntry<T> {
    pub(super) fn new(user_key: UserKey, transport: Arc<T>, generation: u64) -> Self {
        let now = Instant::now();
        Self {
            user_key,
            transport,
            last_heartbeat: now,
            generation,
            registered_at: now,
            monitor: None,
        }
    }

    /// Time since the last heartbeat
    pub fn since_heartbeat(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_heartbeat)
    }

    /// Stop the heartbeat monitor, if running
    pub(super) fn stop_monitor(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients the payload was handed to
    pub delivered: usize,
    /// Recipients skipped because their transport was not open
    pub skipped: usize,
    /// Recipients whose send failed; these were unregistered
    pub failed: usize,
}

impl BroadcastReport {
    /// Total number of recipients considered
    pub fn recipients(&self) -> usize {
        self.delivered + self.skipped + self.failed
    }
}
