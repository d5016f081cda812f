//! # clipflow-rs
//!
//! A clipboard relay server. A device uploads its clipboard over HTTP; every
//! other live device of the same user is told about it over a WebSocket and
//! can fetch the payload.
//!
//! ```text
//!   device A                         server                          device B
//!   ────────                         ──────                          ────────
//!   POST /api/clipboard/text ──▶ FileStore.store
//!                                HistoryStore.add_record
//!                                ConnectionRegistry.broadcast ──▶ {"Type":0,...}  
//!                                                              ◀── GET /api/clipboard/file/{uuid}
//!
//!   FileCleanup (every 5 min): delete payloads older than the retention
//!   window that no history references any more
//! ```
//!
//! The building blocks are usable on their own:
//!
//! - [`history`]: bounded per-user history with type-aware eviction
//! - [`registry`]: live connections, heartbeats and fan-out over any [`Transport`]
//! - [`storage`]: payload stores and the cleanup sweep
//! - [`server`]: the axum HTTP/WebSocket surface
//!
//! # Example
//!
//! ```no_run
//! use clipflow_rs::{ClipServer, ServerConfig, TokenSetting};
//!
//! # async fn run() -> clipflow_rs::Result<()> {
//! let config = ServerConfig::default().token(TokenSetting::new("secret"));
//! let server = ClipServer::new(config).await?;
//! server.run().await
//! # }
//! ```

pub mod auth;
pub mod error;
pub mod history;
pub mod registry;
pub mod relay;
pub mod server;
pub mod storage;

pub use auth::{Principal, TokenAuthenticator, TokenSetting};
pub use error::{Error, Result, TransportError};
pub use history::{ClipboardKind, ClipboardRecord, HistoryStore, RecordId, UserKey};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryConfig, Transport};
pub use relay::ClipboardRelay;
pub use server::{ClipServer, ServerConfig};
pub use storage::{CleanupConfig, FileCleanup, FileStore, FsFileStore, MemoryFileStore};
