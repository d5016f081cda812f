//! Connection registry implementation
//!
//! The central registry that tracks every live connection, watches their
//! heartbeats and fans out change notifications to a user's devices.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::history::UserKey;

use super::config::RegistryConfig;
use super::entry::{BroadcastReport, ConnectionEntry, ConnectionId, ConnectionTicket};
use super::transport::{CloseReason, Transport};

/// Result of one heartbeat monitor check
enum HeartbeatCheck<T> {
    /// Heartbeat is recent enough
    Alive,
    /// Entry removed or replaced by a newer registration
    Gone,
    /// Timed out; carries the transport to close and the silence observed
    Expired(Arc<T>, Duration),
}

/// Result of one per-recipient send
enum SendOutcome {
    Delivered,
    Skipped,
    Failed(TransportError),
}

/// Registry of all live connections
///
/// Thread-safe via `RwLock`. Broadcasting only holds the read lock long
/// enough to snapshot its recipients; sends happen outside the lock.
pub struct ConnectionRegistry<T: Transport> {
    /// Map of connection id to connection entry
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry<T>>>,

    /// Source of registration generations
    next_generation: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl<T: Transport> ConnectionRegistry<T> {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a connection and start its heartbeat monitor
    ///
    /// Registering an id that is already present replaces the old entry. The
    /// old entry's monitor is stopped and, if it used a different transport,
    /// that transport is closed.
    pub async fn register(
        self: &Arc<Self>,
        connection_id: ConnectionId,
        transport: Arc<T>,
        user_key: UserKey,
    ) -> ConnectionTicket {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut entry = ConnectionEntry::new(user_key.clone(), Arc::clone(&transport), generation);

        let previous = {
            let mut connections = self.connections.write().await;
            entry.monitor = Some(self.spawn_monitor(connection_id.clone(), generation));
            connections.insert(connection_id.clone(), entry)
        };

        match previous {
            Some(mut previous) => {
                previous.stop_monitor();

                tracing::info!(
                    connection_id = %connection_id,
                    user = %user_key,
                    generation = generation,
                    replaced_generation = previous.generation,
                    "Connection re-registered"
                );

                if !Arc::ptr_eq(&previous.transport, &transport) {
                    if let Err(e) = previous.transport.close(CloseReason::Normal).await {
                        tracing::debug!(
                            connection_id = %connection_id,
                            error = %e,
                            "Failed to close replaced transport"
                        );
                    }
                }
            }
            None => {
                tracing::info!(
                    connection_id = %connection_id,
                    user = %user_key,
                    generation = generation,
                    "Connection registered"
                );
            }
        }

        ConnectionTicket {
            connection_id,
            generation,
        }
    }

    /// Refresh a connection's heartbeat
    ///
    /// Returns false if the connection is unknown.
    pub async fn heartbeat(&self, connection_id: &ConnectionId) -> bool {
        let mut connections = self.connections.write().await;

        match connections.get_mut(connection_id) {
            Some(entry) => {
                entry.last_heartbeat = Instant::now();
                tracing::trace!(connection_id = %connection_id, "Heartbeat");
                true
            }
            None => {
                tracing::debug!(connection_id = %connection_id, "Heartbeat for unknown connection");
                false
            }
        }
    }

    /// Remove a connection regardless of which registration created it
    ///
    /// Safe to call more than once. Returns true if an entry was removed.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> bool {
        match self.take_entry(connection_id, None).await {
            Some(mut entry) => {
                entry.stop_monitor();
                tracing::info!(
                    connection_id = %connection_id,
                    user = %entry.user_key,
                    "Connection removed"
                );
                true
            }
            None => false,
        }
    }

    /// Remove a connection only if it still belongs to this registration
    pub async fn release(&self, ticket: &ConnectionTicket) -> bool {
        match self
            .take_entry(&ticket.connection_id, Some(ticket.generation))
            .await
        {
            Some(mut entry) => {
                entry.stop_monitor();
                tracing::info!(
                    connection_id = %ticket.connection_id,
                    user = %entry.user_key,
                    generation = ticket.generation,
                    "Connection released"
                );
                true
            }
            None => {
                tracing::debug!(
                    connection_id = %ticket.connection_id,
                    generation = ticket.generation,
                    "Release of stale or removed registration"
                );
                false
            }
        }
    }

    async fn take_entry(
        &self,
        connection_id: &ConnectionId,
        generation: Option<u64>,
    ) -> Option<ConnectionEntry<T>> {
        let mut connections = self.connections.write().await;

        let matches = match (connections.get(connection_id), generation) {
            (Some(entry), Some(generation)) => entry.generation == generation,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if matches {
            connections.remove(connection_id)
        } else {
            None
        }
    }

    /// Send a payload to every connection of a user except `exclude`
    ///
    /// Each recipient gets its own task, so a slow or failing device does not
    /// hold up the others. Returns once every send has finished. Recipients
    /// whose send fails are unregistered.
    pub async fn broadcast(
        &self,
        user_key: &UserKey,
        exclude: Option<&ConnectionId>,
        payload: Bytes,
    ) -> BroadcastReport {
        let recipients: Vec<(ConnectionId, u64, Arc<T>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .filter(|(id, entry)| entry.user_key == *user_key && Some(*id) != exclude)
                .map(|(id, entry)| (id.clone(), entry.generation, Arc::clone(&entry.transport)))
                .collect()
        };

        let mut report = BroadcastReport::default();
        if recipients.is_empty() {
            tracing::debug!(user = %user_key, "Broadcast has no recipients");
            return report;
        }

        let mut sends = JoinSet::new();
        for (connection_id, generation, transport) in recipients {
            let payload = payload.clone();
            sends.spawn(async move {
                let outcome = if !transport.is_open() {
                    SendOutcome::Skipped
                } else {
                    match transport.send(payload).await {
                        Ok(()) => SendOutcome::Delivered,
                        Err(e) => SendOutcome::Failed(e),
                    }
                };
                (connection_id, generation, outcome)
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok((_, _, SendOutcome::Delivered)) => report.delivered += 1,
                Ok((connection_id, _, SendOutcome::Skipped)) => {
                    report.skipped += 1;
                    tracing::debug!(
                        connection_id = %connection_id,
                        "Skipping broadcast to transport that is not open"
                    );
                }
                Ok((connection_id, generation, SendOutcome::Failed(e))) => {
                    report.failed += 1;
                    tracing::warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Broadcast send failed, removing connection"
                    );
                    if let Some(mut entry) = self.take_entry(&connection_id, Some(generation)).await
                    {
                        entry.stop_monitor();
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(error = %e, "Broadcast send task failed");
                }
            }
        }

        tracing::debug!(
            user = %user_key,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast complete"
        );

        report
    }

    /// Check if a connection is registered
    pub async fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.connections.read().await.contains_key(connection_id)
    }

    /// Get total number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Ids of every connection belonging to a user
    pub async fn connections_for_user(&self, user_key: &UserKey) -> Vec<ConnectionId> {
        let connections = self.connections.read().await;
        let mut ids: Vec<ConnectionId> = connections
            .iter()
            .filter(|(_, entry)| entry.user_key == *user_key)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Close and remove every connection
    ///
    /// Used on server shutdown.
    pub async fn shutdown(&self) {
        let entries: Vec<(ConnectionId, ConnectionEntry<T>)> =
            self.connections.write().await.drain().collect();

        for (connection_id, mut entry) in entries {
            entry.stop_monitor();
            if let Err(e) = entry.transport.close(CloseReason::Normal).await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Close on shutdown failed");
            }
        }
    }

    async fn check_heartbeat(
        &self,
        connection_id: &ConnectionId,
        generation: u64,
    ) -> HeartbeatCheck<T> {
        let connections = self.connections.read().await;

        match connections.get(connection_id) {
            Some(entry) if entry.generation == generation => {
                let silence = entry.since_heartbeat(Instant::now());
                if silence > self.config.heartbeat_timeout {
                    HeartbeatCheck::Expired(Arc::clone(&entry.transport), silence)
                } else {
                    HeartbeatCheck::Alive
                }
            }
            _ => HeartbeatCheck::Gone,
        }
    }

    /// Spawn the heartbeat monitor for one registration
    fn spawn_monitor(self: &Arc<Self>, connection_id: ConnectionId, generation: u64) -> AbortHandle {
        let registry = Arc::clone(self);
        let interval = self.config.heartbeat_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;

                match registry.check_heartbeat(&connection_id, generation).await {
                    HeartbeatCheck::Alive => continue,
                    HeartbeatCheck::Gone => return,
                    HeartbeatCheck::Expired(transport, silence) => {
                        tracing::warn!(
                            connection_id = %connection_id,
                            silence_secs = silence.as_secs(),
                            "Heartbeat timeout, closing connection"
                        );

                        match tokio::time::timeout(
                            interval,
                            transport.close(CloseReason::PolicyViolation),
                        )
                        .await
                        {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::error!(
                                connection_id = %connection_id,
                                error = %e,
                                "Failed to close timed out connection"
                            ),
                            Err(_) => tracing::error!(
                                connection_id = %connection_id,
                                "Timed out closing connection"
                            ),
                        }

                        // Dropping the entry drops our own abort handle without firing it
                        registry.take_entry(&connection_id, Some(generation)).await;
                        return;
                    }
                }
            }
        });

        handle.abort_handle()
    }
}

impl<T: Transport> Default for ConnectionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
