//! Payload store abstraction

use std::future::Future;
use std::io;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::Stream;
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::history::RecordId;

/// A payload file as seen by the cleanup sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredFile {
    /// Record the payload belongs to
    pub id: RecordId,
    /// Last modification time
    pub modified: SystemTime,
    /// Size in bytes
    pub size: u64,
}

/// Storage for uploaded clipboard payloads, addressed by record id
pub trait FileStore: Send + Sync + 'static {
    /// Reader returned by [`open`](FileStore::open)
    type Reader: AsyncRead + Send + Unpin + 'static;

    /// Write a payload from a stream of chunks, replacing any existing one
    ///
    /// Returns the number of bytes written. A failed write leaves no file
    /// behind.
    fn store<S>(&self, id: &RecordId, body: S) -> impl Future<Output = Result<u64>> + Send
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin;

    /// Check whether a payload exists
    fn exists(&self, id: &RecordId) -> impl Future<Output = Result<bool>> + Send;

    /// Open a payload for reading, `None` if it does not exist
    fn open(&self, id: &RecordId) -> impl Future<Output = Result<Option<Self::Reader>>> + Send;

    /// List every payload with its modification time
    fn list_with_age(&self) -> impl Future<Output = Result<Vec<StoredFile>>> + Send;

    /// Delete a payload; deleting a missing payload is not an error
    fn delete(&self, id: &RecordId) -> impl Future<Output = Result<()>> + Send;
}
