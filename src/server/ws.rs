//! WebSocket transport
//!
//! Wraps an upgraded axum [`WebSocket`] as a [`Transport`]. The socket is
//! split so the session loop can wait on inbound frames while broadcasts and
//! the heartbeat monitor write to the same connection. Closing from the
//! server side also wakes a pending [`Transport::receive`], so a peer that
//! never answers the close frame cannot hold its session open.

use std::sync::atomic::{AtomicU8, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::registry::{CloseReason, Inbound, Transport, TransportState};

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Server side of one device's WebSocket
pub struct WsTransport {
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
    state: AtomicU8,
    closed: CancellationToken,
}

impl WsTransport {
    /// Wrap an upgraded socket
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            state: AtomicU8::new(OPEN),
            closed: CancellationToken::new(),
        }
    }

    fn mark_closed(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }
}

/// UTF-8 payloads go out as text frames, anything else as binary
fn outbound(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(payload),
    }
}

impl Transport for WsTransport {
    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }

        let mut sink = self.sink.lock().await;
        sink.send(outbound(payload)).await.map_err(|e| {
            self.mark_closed();
            TransportError::Send(e.to_string())
        })
    }

    async fn receive(&self) -> Result<Inbound, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.closed.cancelled() => {
                    self.mark_closed();
                    return Ok(Inbound::Close(None));
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => return Ok(Inbound::Text(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => return Ok(Inbound::Binary(data)),
                // Control frames are answered by the protocol layer
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    self.mark_closed();
                    return Ok(Inbound::Close(
                        frame.map(|f| f.reason.as_str().to_owned()),
                    ));
                }
                Some(Err(e)) => {
                    self.mark_closed();
                    return Err(TransportError::Receive(e.to_string()));
                }
                None => {
                    self.mark_closed();
                    return Ok(Inbound::Close(None));
                }
            }
        }
    }

    async fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
        if self
            .state
            .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        self.closed.cancel();

        let frame = CloseFrame {
            code: reason.code(),
            reason: reason.description().into(),
        };

        let mut sink = self.sink.lock().await;
        let result = sink.send(Message::Close(Some(frame))).await;
        self.mark_closed();
        result.map_err(|e| TransportError::Send(e.to_string()))
    }

    fn state(&self) -> TransportState {
        match self.state.load(Ordering::Acquire) {
            OPEN => TransportState::Open,
            CLOSING => TransportState::Closing,
            _ => TransportState::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::WebSocketUpgrade;
    use axum::routing::get;
    use axum::Router;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;
    use crate::history::UserKey;
    use crate::registry::{run_session, ConnectionId, ConnectionRegistry, RegistryConfig, SessionEnd};

    #[test]
    fn test_outbound_frame_type() {
        let text = outbound(Bytes::from_static(br#"{"Type":0}"#));
        assert!(matches!(text, Message::Text(t) if t.as_str() == r#"{"Type":0}"#));

        let binary = outbound(Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(binary, Message::Binary(b) if b.as_ref() == [0xff, 0xfe]));
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_ends_session_of_silent_peer() {
        let config = RegistryConfig::default()
            .heartbeat_interval(Duration::from_millis(50))
            .heartbeat_timeout(Duration::from_millis(200));
        let registry = Arc::new(ConnectionRegistry::<WsTransport>::with_config(config));
        let (end_tx, mut end_rx) = mpsc::unbounded_channel();

        let app = Router::new().route(
            "/ws",
            get({
                let registry = Arc::clone(&registry);
                move |ws: WebSocketUpgrade| {
                    let registry = Arc::clone(&registry);
                    let end_tx = end_tx.clone();
                    async move {
                        ws.on_upgrade(move |socket| async move {
                            let transport = Arc::new(WsTransport::new(socket));
                            let end = run_session(
                                &registry,
                                transport,
                                ConnectionId::new("laptop"),
                                UserKey::new("alice"),
                            )
                            .await;
                            let _ = end_tx.send(end);
                        })
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        // Connected but never polled, so the close frame is never answered
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();

        let end = tokio::time::timeout(Duration::from_secs(5), end_rx.recv())
            .await
            .expect("session still running after heartbeat timeout")
            .unwrap();

        assert_eq!(end, SessionEnd::PeerClosed(None));
        assert!(!registry.contains(&ConnectionId::new("laptop")).await);
        assert_eq!(registry.connection_count().await, 0);

        drop(client);
    }
}
