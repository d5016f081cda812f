//! Per-user history store
//!
//! Maps each user key to its own [`HistoryQueue`]. The outer map is only
//! write-locked to create a user's entry; all other access takes the outer
//! read lock and then locks the one user involved, so different users never
//! contend on the same queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::queue::HistoryQueue;
use super::record::{ClipboardRecord, RecordId, UserKey};

/// Clipboard history for all users
pub struct HistoryStore {
    /// Map of user key to that user's queue
    users: RwLock<HashMap<UserKey, Arc<RwLock<HistoryQueue>>>>,

    /// Capacity of each user's queue
    capacity: usize,
}

impl HistoryStore {
    /// Create a store with the default per-user capacity
    pub fn new() -> Self {
        Self::with_capacity(super::queue::MAX_HISTORY_SIZE)
    }

    /// Create a store with a custom per-user capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    async fn entry(&self, user_key: &UserKey) -> Option<Arc<RwLock<HistoryQueue>>> {
        self.users.read().await.get(user_key).cloned()
    }

    async fn entry_or_create(&self, user_key: &UserKey) -> Arc<RwLock<HistoryQueue>> {
        if let Some(entry) = self.entry(user_key).await {
            return entry;
        }

        let mut users = self.users.write().await;
        let capacity = self.capacity;
        Arc::clone(
            users
                .entry(user_key.clone())
                .or_insert_with(|| Arc::new(RwLock::new(HistoryQueue::with_capacity(capacity)))),
        )
    }

    /// Add a record as the user's newest entry
    ///
    /// Returns the record evicted to make room, if any.
    pub async fn add_record(
        &self,
        user_key: &UserKey,
        record: ClipboardRecord,
    ) -> Option<ClipboardRecord> {
        let entry = self.entry_or_create(user_key).await;
        let mut queue = entry.write().await;
        let evicted = queue.push(record);

        tracing::debug!(
            user = %user_key,
            record = %record.id,
            kind = %record.kind,
            evicted = ?evicted.map(|r| r.id),
            len = queue.len(),
            "History record added"
        );

        evicted
    }

    /// Most recently added record for a user
    pub async fn latest(&self, user_key: &UserKey) -> Option<ClipboardRecord> {
        let entry = self.entry(user_key).await?;
        let queue = entry.read().await;
        queue.latest().copied()
    }

    /// Most recently added text record for a user
    pub async fn latest_text(&self, user_key: &UserKey) -> Option<ClipboardRecord> {
        let entry = self.entry(user_key).await?;
        let queue = entry.read().await;
        queue.latest_text().copied()
    }

    /// Look up a record in one user's history
    pub async fn by_id(&self, user_key: &UserKey, id: &RecordId) -> Option<ClipboardRecord> {
        let entry = self.entry(user_key).await?;
        let queue = entry.read().await;
        queue.get(id).copied()
    }

    /// Copy of one user's history, oldest first
    pub async fn history(&self, user_key: &UserKey) -> Vec<ClipboardRecord> {
        match self.entry(user_key).await {
            Some(entry) => entry.read().await.to_vec(),
            None => Vec::new(),
        }
    }

    /// Snapshot of every user's history
    pub async fn all_entries(&self) -> Vec<(UserKey, Vec<ClipboardRecord>)> {
        let entries: Vec<_> = {
            let users = self.users.read().await;
            users
                .iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut snapshot = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            snapshot.push((key, entry.read().await.to_vec()));
        }
        snapshot
    }

    /// Check whether any user's history references a record
    ///
    /// Users are visited one at a time and the walk stops at the first hit.
    pub async fn is_referenced(&self, id: &RecordId) -> bool {
        let entries: Vec<_> = self.users.read().await.values().cloned().collect();

        for entry in entries {
            if entry.read().await.contains(id) {
                return true;
            }
        }
        false
    }

    /// Number of users with a history entry
    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
