//! Payload storage and lifecycle
//!
//! Uploaded clipboard payloads live outside the history, one blob per record
//! id. [`FileCleanup`] reclaims them once they are old and no longer
//! referenced by any history.

pub mod cleanup;
pub mod file_store;
pub mod fs;
pub mod memory;

pub use cleanup::{CleanupConfig, FileCleanup, SweepReport};
pub use file_store::{FileStore, StoredFile};
pub use fs::FsFileStore;
pub use memory::MemoryFileStore;
