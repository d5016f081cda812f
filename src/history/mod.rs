//! Per-user clipboard history
//!
//! Each user keeps a short, bounded list of their latest clipboard records.
//! Only metadata lives here; payload bytes are in the file store.
//!
//! ```text
//!                   Arc<HistoryStore>
//!              ┌──────────────────────────┐
//!              │ users: HashMap<UserKey,  │
//!              │   HistoryQueue [≤ 3]     │
//!              │ >                        │
//!              └────────────┬─────────────┘
//!                           │
//!        ┌──────────────────┼──────────────────┐
//!        ▼                  ▼                  ▼
//!   add_record()      latest()/by_id()    is_referenced()
//!   (upload path)     (fetch path)        (file cleanup)
//! ```

pub mod queue;
pub mod record;
pub mod store;

pub use queue::{HistoryQueue, MAX_HISTORY_SIZE};
pub use record::{ClipboardKind, ClipboardRecord, RecordId, UserKey};
pub use store::HistoryStore;
