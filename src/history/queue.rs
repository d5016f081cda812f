//! Bounded per-user history with type-aware eviction
//!
//! The queue keeps at most `capacity` records, oldest first. When it is full,
//! the oldest record normally makes room for the new one. The exception: if
//! the most recent text record is the oldest entry and a non-text record
//! arrives, the text is kept and the oldest non-text record after it is
//! dropped instead. A user copying several files in a row therefore keeps
//! the last piece of text they copied.

use std::collections::VecDeque;

use super::record::{ClipboardRecord, RecordId};

/// Default number of records kept per user
pub const MAX_HISTORY_SIZE: usize = 3;

/// Bounded sequence of clipboard records, oldest first
#[derive(Debug, Clone)]
pub struct HistoryQueue {
    records: VecDeque<ClipboardRecord>,
    capacity: usize,
}

impl HistoryQueue {
    /// Create an empty queue holding up to [`MAX_HISTORY_SIZE`] records
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_SIZE)
    }

    /// Create an empty queue with a custom capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a record as the newest entry
    ///
    /// Returns the evicted record, if one had to make room.
    ///
    /// When the newest text record is the oldest entry and no later non-text
    /// record exists, nothing is evicted and the queue ends up one over
    /// capacity. This cannot happen with a capacity of two or more.
    pub fn push(&mut self, record: ClipboardRecord) -> Option<ClipboardRecord> {
        let evicted = if self.records.len() >= self.capacity {
            self.evict_for(&record)
        } else {
            None
        };

        self.records.push_back(record);
        evicted
    }

    fn evict_for(&mut self, incoming: &ClipboardRecord) -> Option<ClipboardRecord> {
        let last_text = self.records.iter().rposition(|r| r.kind.is_text());

        match last_text {
            Some(0) if !incoming.kind.is_text() => {
                // Keep the text; drop the oldest non-text entry behind it
                let victim = self
                    .records
                    .iter()
                    .skip(1)
                    .position(|r| !r.kind.is_text())
                    .map(|offset| offset + 1)?;
                self.records.remove(victim)
            }
            _ => self.records.pop_front(),
        }
    }

    /// Most recently added record
    pub fn latest(&self) -> Option<&ClipboardRecord> {
        self.records.back()
    }

    /// Most recently added text record
    pub fn latest_text(&self) -> Option<&ClipboardRecord> {
        self.records.iter().rev().find(|r| r.kind.is_text())
    }

    /// Find a record by id
    pub fn get(&self, id: &RecordId) -> Option<&ClipboardRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Check whether a record with this id is present
    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate records, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ClipboardRecord> {
        self.records.iter()
    }

    /// Copy the records out, oldest first
    pub fn to_vec(&self) -> Vec<ClipboardRecord> {
        self.records.iter().copied().collect()
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryQueue {
    fn default() -> Self {
        Self::new()
    }
}
