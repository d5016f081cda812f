//! Payload file cleanup
//!
//! A periodic sweep that deletes payload files once they are older than the
//! retention window and no user's history refers to them any more. A file
//! still referenced is left alone and looked at again next cycle.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::history::HistoryStore;

use super::file_store::FileStore;

/// Configuration for the cleanup sweep
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Time between sweeps
    pub sweep_interval: Duration,

    /// Minimum age before an unreferenced file is deleted
    pub retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(60 * 60),
        }
    }
}

impl CleanupConfig {
    /// Set the sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the retention window
    pub fn retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the retention window in minutes
    pub fn file_cache_minutes(self, minutes: u64) -> Self {
        self.retention(Duration::from_secs(minutes * 60))
    }
}

/// Counters for one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Files listed
    pub examined: usize,
    /// Files older than the retention window
    pub expired: usize,
    /// Expired files deleted
    pub deleted: usize,
    /// Expired files kept because a history still refers to them
    pub retained: usize,
    /// Expired files whose deletion failed
    pub failed: usize,
}

/// Periodic payload sweep
pub struct FileCleanup<S: FileStore> {
    store: Arc<S>,
    history: Arc<HistoryStore>,
    config: CleanupConfig,
}

impl<S: FileStore> FileCleanup<S> {
    /// Create a sweep over `store`, checking references against `history`
    pub fn new(store: Arc<S>, history: Arc<HistoryStore>, config: CleanupConfig) -> Self {
        Self {
            store,
            history,
            config,
        }
    }

    /// Get the cleanup configuration
    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    /// Run one sweep now
    pub async fn sweep_once(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Run one sweep treating `now` as the current time
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let Some(cutoff) = now.checked_sub(self.config.retention) else {
            return report;
        };

        let files = match self.store.list_with_age().await {
            Ok(files) => files,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list payload files");
                return report;
            }
        };

        for file in files {
            report.examined += 1;
            if file.modified >= cutoff {
                continue;
            }
            report.expired += 1;

            if self.history.is_referenced(&file.id).await {
                report.retained += 1;
                tracing::info!(record = %file.id, "Payload still referenced, skipping");
                continue;
            }

            match self.store.delete(&file.id).await {
                Ok(()) => {
                    report.deleted += 1;
                    tracing::info!(record = %file.id, bytes = file.size, "Deleted expired payload");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(record = %file.id, error = %e, "Failed to delete expired payload");
                }
            }
        }

        tracing::debug!(
            examined = report.examined,
            expired = report.expired,
            deleted = report.deleted,
            retained = report.retained,
            failed = report.failed,
            "Payload sweep complete"
        );

        report
    }

    /// Spawn the background sweep task
    ///
    /// The first sweep runs immediately. Returns a handle that can be used to
    /// abort the task.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cleanup = Arc::clone(self);
        let interval = cleanup.config.sweep_interval;

        tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                retention_secs = cleanup.config.retention.as_secs(),
                "Payload cleanup started"
            );

            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cleanup.sweep_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::history::{ClipboardRecord, UserKey};
    use crate::storage::memory::MemoryFileStore;

    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn setup() -> (Arc<MemoryFileStore>, Arc<HistoryStore>, FileCleanup<MemoryFileStore>) {
        let store = Arc::new(MemoryFileStore::new());
        let history = Arc::new(HistoryStore::new());
        let cleanup = FileCleanup::new(
            Arc::clone(&store),
            Arc::clone(&history),
            CleanupConfig::default(),
        );
        (store, history, cleanup)
    }

    #[test]
    fn test_default_config() {
        let config = CleanupConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.retention, HOUR);

        let config = CleanupConfig::default().file_cache_minutes(15);
        assert_eq!(config.retention, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_deletes_expired_unreferenced() {
        let (store, _history, cleanup) = setup();
        let now = SystemTime::now();
        let old = ClipboardRecord::file(Some(3));
        let fresh = ClipboardRecord::file(Some(3));

        store.insert(old.id, "old", now - 2 * HOUR);
        store.insert(fresh.id, "new", now - Duration::from_secs(60));

        let report = cleanup.sweep_at(now).await;

        assert_eq!(report.examined, 2);
        assert_eq!(report.expired, 1);
        assert_eq!(report.deleted, 1);
        assert!(store.get(&old.id).is_none());
        assert!(store.get(&fresh.id).is_some());
    }

    #[tokio::test]
    async fn test_keeps_referenced_files() {
        let (store, history, cleanup) = setup();
        let now = SystemTime::now();
        let record = ClipboardRecord::text(Some(5));

        history.add_record(&UserKey::new("alice"), record).await;
        store.insert(record.id, "hello", now - 3 * HOUR);

        let report = cleanup.sweep_at(now).await;

        assert_eq!(report.retained, 1);
        assert_eq!(report.deleted, 0);
        assert!(store.get(&record.id).is_some());
    }

    #[tokio::test]
    async fn test_evicted_record_becomes_collectable() {
        let (store, history, cleanup) = setup();
        let now = SystemTime::now();
        let alice = UserKey::new("alice");

        let first = ClipboardRecord::file(None);
        history.add_record(&alice, first).await;
        store.insert(first.id, "payload", now - 2 * HOUR);

        assert_eq!(cleanup.sweep_at(now).await.retained, 1);

        for _ in 0..3 {
            history.add_record(&alice, ClipboardRecord::file(None)).await;
        }

        let report = cleanup.sweep_at(now).await;
        assert_eq!(report.deleted, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_does_not_stop_sweep() {
        let (store, _history, cleanup) = setup();
        let now = SystemTime::now();

        let stuck = ClipboardRecord::file(None);
        let others = [ClipboardRecord::file(None), ClipboardRecord::file_list(None)];

        store.insert(stuck.id, "stuck", now - 2 * HOUR);
        store.fail_deletes_for(stuck.id);
        for record in &others {
            store.insert(record.id, "x", now - 2 * HOUR);
        }

        let report = cleanup.sweep_at(now).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweep_runs_immediately() {
        let (store, history, _) = setup();
        let record = ClipboardRecord::file(None);
        store.insert(record.id, "x", SystemTime::now() - 2 * HOUR);

        let cleanup = Arc::new(FileCleanup::new(
            Arc::clone(&store),
            history,
            CleanupConfig::default(),
        ));
        let handle = cleanup.spawn();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.is_empty());

        handle.abort();
    }
}
