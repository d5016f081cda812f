//! Per-connection session loop
//!
//! Registers a connection, then answers heartbeats until the peer goes away:
//!
//! - text `ping` refreshes the heartbeat and is answered with `pong`
//! - any other text is logged and ignored
//! - a close frame, end of stream or receive error ends the session
//!
//! On exit the session releases its own registration.

use std::sync::Arc;

use bytes::Bytes;

use crate::history::UserKey;

use super::entry::ConnectionId;
use super::store::ConnectionRegistry;
use super::transport::{Inbound, Transport};

/// Heartbeat request sent by clients
pub const PING: &str = "ping";

/// Heartbeat reply sent by the server
pub const PONG: &str = "pong";

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer sent a close frame or the stream ended
    PeerClosed(Option<String>),
    /// Receiving failed
    ReceiveFailed(String),
    /// Replying to a heartbeat failed
    ReplyFailed(String),
}

/// Run one connection until it closes
pub async fn run_session<T: Transport>(
    registry: &Arc<ConnectionRegistry<T>>,
    transport: Arc<T>,
    connection_id: ConnectionId,
    user_key: UserKey,
) -> SessionEnd {
    let ticket = registry
        .register(connection_id.clone(), Arc::clone(&transport), user_key)
        .await;

    let end = loop {
        match transport.receive().await {
            Ok(Inbound::Text(text)) if text == PING => {
                registry.heartbeat(&connection_id).await;
                if let Err(e) = transport.send(Bytes::from_static(PONG.as_bytes())).await {
                    break SessionEnd::ReplyFailed(e.to_string());
                }
            }
            Ok(Inbound::Text(text)) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    len = text.len(),
                    "Unexpected text message"
                );
            }
            Ok(Inbound::Binary(data)) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    len = data.len(),
                    "Ignoring binary message"
                );
            }
            Ok(Inbound::Close(reason)) => break SessionEnd::PeerClosed(reason),
            Err(e) => break SessionEnd::ReceiveFailed(e.to_string()),
        }
    };

    match &end {
        SessionEnd::PeerClosed(reason) => {
            tracing::info!(connection_id = %connection_id, reason = ?reason, "Connection closed by peer");
        }
        SessionEnd::ReceiveFailed(e) | SessionEnd::ReplyFailed(e) => {
            tracing::error!(connection_id = %connection_id, error = %e, "Connection failed");
        }
    }

    registry.release(&ticket).await;
    end
}
