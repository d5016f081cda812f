//! Clipboard relay service
//!
//! Ties the pieces together for the request paths: an upload stores the
//! payload, records it in the user's history and notifies the user's other
//! devices; lookups read the history and open payloads.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::auth::Principal;
use crate::error::{Error, Result};
use crate::history::{ClipboardKind, ClipboardRecord, HistoryStore, RecordId, UserKey};
use crate::registry::{ConnectionId, ConnectionRegistry, Transport};
use crate::storage::FileStore;

/// Marker error placed inside the `io::Error` when an upload goes over its cap
#[derive(Debug)]
struct BodyLimitExceeded {
    limit: u64,
    seen: u64,
}

impl fmt::Display for BodyLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body exceeds {} bytes", self.limit)
    }
}

impl std::error::Error for BodyLimitExceeded {}

/// Fail the stream once more than `limit` bytes have gone through
fn cap_body<B>(body: B, limit: u64) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin
where
    B: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    let mut seen = 0u64;
    body.map(move |chunk| {
        let chunk = chunk?;
        seen += chunk.len() as u64;
        if seen > limit {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                BodyLimitExceeded { limit, seen },
            ))
        } else {
            Ok(chunk)
        }
    })
}

/// Upload and lookup operations over shared history, registry and store
pub struct ClipboardRelay<S: FileStore, T: Transport> {
    history: Arc<HistoryStore>,
    registry: Arc<ConnectionRegistry<T>>,
    store: Arc<S>,
    max_body: u64,
}

impl<S: FileStore, T: Transport> ClipboardRelay<S, T> {
    /// Create a relay; `max_body` caps every upload regardless of token
    pub fn new(
        history: Arc<HistoryStore>,
        registry: Arc<ConnectionRegistry<T>>,
        store: Arc<S>,
        max_body: u64,
    ) -> Self {
        Self {
            history,
            registry,
            store,
            max_body,
        }
    }

    /// Shared history store
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Shared connection registry
    pub fn registry(&self) -> &Arc<ConnectionRegistry<T>> {
        &self.registry
    }

    /// Shared payload store
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Store an upload, record it and notify the user's other devices
    ///
    /// `origin` is the uploading device's connection, which is not notified.
    /// `content_length` is checked against the caller's limit up front; the
    /// body is also capped while streaming.
    pub async fn upload<B>(
        &self,
        principal: &Principal,
        origin: Option<&ConnectionId>,
        kind: ClipboardKind,
        data_length: Option<u64>,
        content_length: Option<u64>,
        body: B,
    ) -> Result<ClipboardRecord>
    where
        B: Stream<Item = io::Result<Bytes>> + Send + Unpin,
    {
        let token_limit = principal.max_upload_bytes;
        let limit = token_limit.map_or(self.max_body, |l| l.min(self.max_body));

        if let Some(actual) = content_length {
            if actual > limit {
                return Err(self.over_limit(token_limit, actual));
            }
        }

        let record = ClipboardRecord::new(kind, data_length);

        let written = match self.store.store(&record.id, cap_body(body, limit)).await {
            Ok(written) => written,
            Err(Error::Io(e)) => {
                let exceeded = e
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<BodyLimitExceeded>())
                    .map(|inner| inner.seen);
                return Err(match exceeded {
                    Some(seen) => self.over_limit(token_limit, seen),
                    None => Error::Io(e),
                });
            }
            Err(e) => return Err(e),
        };

        self.history.add_record(&principal.user_key, record).await;

        let notification = record.to_notification()?;
        let report = self
            .registry
            .broadcast(&principal.user_key, origin, notification)
            .await;

        tracing::info!(
            user = %principal.user_key,
            origin = ?origin.map(|id| id.as_str()),
            record = %record.id,
            kind = %record.kind,
            bytes = written,
            notified = report.delivered,
            "Clipboard uploaded"
        );

        Ok(record)
    }

    /// Token limit breaches are `PayloadTooLarge`; the global cap is a bad request
    fn over_limit(&self, token_limit: Option<u64>, actual: u64) -> Error {
        match token_limit {
            Some(limit) if limit <= self.max_body => Error::PayloadTooLarge { limit, actual },
            _ => Error::InvalidRequest(format!(
                "request body exceeds {} bytes",
                self.max_body
            )),
        }
    }

    /// Latest record, or latest text record when `only_text` is set
    pub async fn latest(&self, user_key: &UserKey, only_text: bool) -> Result<ClipboardRecord> {
        let latest = if only_text {
            self.history.latest_text(user_key).await
        } else {
            self.history.latest(user_key).await
        };
        latest.ok_or(Error::NotFound("Clipboard data"))
    }

    /// Open the payload of a record in the user's history
    pub async fn open_payload(
        &self,
        user_key: &UserKey,
        id: &RecordId,
    ) -> Result<(ClipboardRecord, S::Reader)> {
        let record = self
            .history
            .by_id(user_key, id)
            .await
            .ok_or(Error::NotFound("Record"))?;

        let reader = self
            .store
            .open(id)
            .await?
            .ok_or(Error::NotFound("Payload"))?;

        Ok((record, reader))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::io::AsyncReadExt;

    use crate::registry::transport::mock::MockTransport;

    use super::*;
    use crate::storage::MemoryFileStore;

    type TestRelay = ClipboardRelay<MemoryFileStore, MockTransport>;

    fn relay() -> TestRelay {
        ClipboardRelay::new(
            Arc::new(HistoryStore::new()),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(MemoryFileStore::new()),
            1024,
        )
    }

    fn principal(user: &str, limit: Option<u64>) -> Principal {
        Principal {
            user_key: UserKey::new(user),
            max_upload_bytes: limit,
        }
    }

    fn body(data: &'static [u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    #[tokio::test]
    async fn test_upload_notifies_other_devices() {
        let relay = relay();
        let (laptop, _l) = MockTransport::new();
        let (phone, _p) = MockTransport::new();
        let laptop = Arc::new(laptop);
        let phone = Arc::new(phone);
        let alice = UserKey::new("alice");

        relay
            .registry()
            .register(ConnectionId::new("laptop"), Arc::clone(&laptop), alice.clone())
            .await;
        relay
            .registry()
            .register(ConnectionId::new("phone"), Arc::clone(&phone), alice.clone())
            .await;

        let record = relay
            .upload(
                &principal("alice", None),
                Some(&ConnectionId::new("laptop")),
                ClipboardKind::Text,
                Some(5),
                Some(5),
                body(b"hello"),
            )
            .await
            .unwrap();

        assert!(laptop.sent().is_empty());
        let sent = phone.sent();
        assert_eq!(sent.len(), 1);
        let notified: ClipboardRecord = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(notified, record);

        assert_eq!(relay.history().latest(&alice).await, Some(record));
        assert_eq!(
            relay.store().get(&record.id),
            Some(Bytes::from_static(b"hello"))
        );
    }

    #[tokio::test]
    async fn test_upload_over_token_limit() {
        let relay = relay();

        let err = relay
            .upload(
                &principal("alice", Some(4)),
                None,
                ClipboardKind::File,
                None,
                Some(5),
                body(b"hello"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PayloadTooLarge { limit: 4, actual: 5 }));
        assert!(relay.history().latest(&UserKey::new("alice")).await.is_none());
        assert!(relay.store().is_empty());
    }

    #[tokio::test]
    async fn test_streaming_body_capped_without_content_length() {
        let relay = relay();
        let chunks = stream::iter(vec![
            Ok(Bytes::from(vec![0u8; 600])),
            Ok(Bytes::from(vec![0u8; 600])),
        ]);

        let err = relay
            .upload(
                &principal("alice", None),
                None,
                ClipboardKind::File,
                None,
                None,
                chunks,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(relay.history().latest(&UserKey::new("alice")).await.is_none());
    }

    #[tokio::test]
    async fn test_streaming_body_capped_by_token_limit() {
        let relay = relay();
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"def")),
        ]);

        let err = relay
            .upload(
                &principal("alice", Some(4)),
                None,
                ClipboardKind::Text,
                None,
                None,
                chunks,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PayloadTooLarge { limit: 4, actual: 6 }));
        assert!(relay.store().is_empty());
    }

    #[tokio::test]
    async fn test_latest_and_only_text() {
        let relay = relay();
        let alice = UserKey::new("alice");

        assert!(matches!(
            relay.latest(&alice, false).await,
            Err(Error::NotFound(_))
        ));

        let file = relay
            .upload(&principal("alice", None), None, ClipboardKind::File, None, None, body(b"f"))
            .await
            .unwrap();

        assert_eq!(relay.latest(&alice, false).await.unwrap(), file);
        assert!(matches!(
            relay.latest(&alice, true).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_open_payload() {
        let relay = relay();
        let alice = UserKey::new("alice");

        let record = relay
            .upload(
                &principal("alice", None),
                None,
                ClipboardKind::FileList,
                Some(3),
                None,
                body(b"zip"),
            )
            .await
            .unwrap();

        let (found, mut reader) = relay.open_payload(&alice, &record.id).await.unwrap();
        assert_eq!(found, record);
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await.unwrap();
        assert_eq!(data, b"zip");

        // Other users cannot fetch it
        assert!(matches!(
            relay.open_payload(&UserKey::new("bob"), &record.id).await,
            Err(Error::NotFound("Record"))
        ));

        // Record known but payload gone
        relay.store().delete(&record.id).await.unwrap();
        assert!(matches!(
            relay.open_payload(&alice, &record.id).await,
            Err(Error::NotFound("Payload"))
        ));
    }
}
