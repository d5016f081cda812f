//! Live connection registry
//!
//! The registry tracks every connected device, grouped by user, and fans out
//! change notifications to all of a user's devices except the one that made
//! the change.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<ConnectionRegistry<T>>
//!                   ┌─────────────────────────────┐
//!                   │ connections: HashMap<Id,    │
//!                   │   ConnectionEntry {         │
//!                   │     user_key,               │
//!                   │     transport: Arc<T>,      │
//!                   │     last_heartbeat,         │
//!                   │     monitor: AbortHandle,   │
//!                   │   }                         │
//!                   │ >                           │
//!                   └──────────────┬──────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [Session loop]          [Heartbeat monitor]        [Upload path]
//!   ping → heartbeat()      every 10s, close after     broadcast(user,
//!   close → release()       60s of silence             exclude, payload)
//! ```
//!
//! # Fan-out
//!
//! `broadcast` snapshots the recipients under the read lock and then sends
//! to each one from its own task, so registrations and heartbeats are never
//! blocked behind a slow device. Delivery is best effort: nothing is queued
//! or retried.

pub mod config;
pub mod entry;
pub mod session;
pub mod store;
pub mod transport;

pub use config::RegistryConfig;
pub use entry::{BroadcastReport, ConnectionEntry, ConnectionId, ConnectionTicket};
pub use session::{run_session, SessionEnd, PING, PONG};
pub use store::ConnectionRegistry;
pub use transport::{CloseReason, Inbound, Transport, TransportState};
