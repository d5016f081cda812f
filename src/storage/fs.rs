//! Filesystem payload store
//!
//! One file per record, named `<uuid>.dat`, in a single directory.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::Result;
use crate::history::RecordId;

use super::file_store::{FileStore, StoredFile};

/// Extension used for payload files
pub const PAYLOAD_EXTENSION: &str = "dat";

const WRITE_BUFFER_SIZE: usize = 80 * 1024;

/// Payload store backed by a directory
#[derive(Debug, Clone)]
pub struct FsFileStore {
    root: PathBuf,
}

impl FsFileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open_dir(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        tracing::debug!(root = %root.display(), "Payload store ready");
        Ok(Self { root })
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a record's payload file
    pub fn path_for(&self, id: &RecordId) -> PathBuf {
        self.root.join(format!("{}.{}", id, PAYLOAD_EXTENSION))
    }

    async fn write_body<S>(path: &Path, mut body: S) -> io::Result<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
    {
        let file = File::create(path).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        writer.flush().await?;
        Ok(written)
    }
}

impl FileStore for FsFileStore {
    type Reader = File;

    async fn store<S>(&self, id: &RecordId, body: S) -> Result<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
    {
        let path = self.path_for(id);

        match Self::write_body(&path, body).await {
            Ok(written) => {
                tracing::debug!(record = %id, bytes = written, "Payload stored");
                Ok(written)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&path).await {
                    if remove_err.kind() != io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %remove_err,
                            "Failed to remove partial payload"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn exists(&self, id: &RecordId) -> Result<bool> {
        Ok(fs::try_exists(self.path_for(id)).await?)
    }

    async fn open(&self, id: &RecordId) -> Result<Option<File>> {
        match File::open(self.path_for(id)).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_with_age(&self) -> Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<RecordId>().ok())
            else {
                tracing::debug!(path = %path.display(), "Skipping foreign file in payload store");
                continue;
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to stat payload");
                    continue;
                }
            };

            let modified = match metadata.modified() {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "No modification time");
                    continue;
                }
            };

            files.push(StoredFile {
                id,
                modified,
                size: metadata.len(),
            });
        }

        Ok(files)
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::io::AsyncReadExt;

    use super::*;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = io::Result<Bytes>> + Send + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn test_store_open_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore::open_dir(dir.path().join("files")).await.unwrap();
        let id = RecordId::new_v4();

        let written = store
            .store(&id, chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(written, 11);
        assert!(store.exists(&id).await.unwrap());
        assert!(store.path_for(&id).ends_with(format!("{}.dat", id)));

        let mut reader = store.open(&id).await.unwrap().unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).await.unwrap();
        assert_eq!(contents, "hello world");

        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
        assert!(store.open(&id).await.unwrap().is_none());

        // Deleting again is fine
        store.delete(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_with_age_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore::open_dir(dir.path()).await.unwrap();
        let id = RecordId::new_v4();

        store.store(&id, chunks(&[b"abc"])).await.unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep me").await.unwrap();

        let files = store.list_with_age().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, id);
        assert_eq!(files[0].size, 3);
        assert!(files[0].modified.elapsed().is_ok());
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsFileStore::open_dir(dir.path()).await.unwrap();
        let id = RecordId::new_v4();

        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);

        assert!(store.store(&id, body).await.is_err());
        assert!(!store.exists(&id).await.unwrap());
    }
}
