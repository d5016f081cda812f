//! In-memory payload store
//!
//! Keeps payloads in a map. Useful for embedding and tests; modification
//! times can be set explicitly to exercise the cleanup sweep.

use std::collections::{HashMap, HashSet};
use std::io::{self, Cursor};
use std::sync::Mutex;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};

use crate::error::Result;
use crate::history::RecordId;

use super::file_store::{FileStore, StoredFile};

struct StoredPayload {
    data: Bytes,
    modified: SystemTime,
}

/// Payload store held entirely in memory
#[derive(Default)]
pub struct MemoryFileStore {
    payloads: Mutex<HashMap<RecordId, StoredPayload>>,
    failing_deletes: Mutex<HashSet<RecordId>>,
}

impl MemoryFileStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a payload directly
    pub fn insert(&self, id: RecordId, data: impl Into<Bytes>, modified: SystemTime) {
        self.lock().insert(
            id,
            StoredPayload {
                data: data.into(),
                modified,
            },
        );
    }

    /// Override a payload's modification time
    pub fn set_modified(&self, id: &RecordId, modified: SystemTime) {
        if let Some(payload) = self.lock().get_mut(id) {
            payload.modified = modified;
        }
    }

    /// Make future deletes of this payload fail
    pub fn fail_deletes_for(&self, id: RecordId) {
        self.failing_deletes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id);
    }

    /// Copy of a stored payload
    pub fn get(&self, id: &RecordId) -> Option<Bytes> {
        self.lock().get(id).map(|p| p.data.clone())
    }

    /// Number of stored payloads
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RecordId, StoredPayload>> {
        self.payloads
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FileStore for MemoryFileStore {
    type Reader = Cursor<Bytes>;

    async fn store<S>(&self, id: &RecordId, mut body: S) -> Result<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
    {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }

        let written = buf.len() as u64;
        self.insert(*id, buf.freeze(), SystemTime::now());
        Ok(written)
    }

    async fn exists(&self, id: &RecordId) -> Result<bool> {
        Ok(self.lock().contains_key(id))
    }

    async fn open(&self, id: &RecordId) -> Result<Option<Cursor<Bytes>>> {
        Ok(self.get(id).map(Cursor::new))
    }

    async fn list_with_age(&self) -> Result<Vec<StoredFile>> {
        Ok(self
            .lock()
            .iter()
            .map(|(id, payload)| StoredFile {
                id: *id,
                modified: payload.modified,
                size: payload.data.len() as u64,
            })
            .collect())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let failing = self
            .failing_deletes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id);
        if failing {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "delete refused").into());
        }

        self.lock().remove(id);
        Ok(())
    }
}
