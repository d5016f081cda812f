//! Transport abstraction
//!
//! The registry only needs to push frames to a connection, close it and ask
//! whether it is still open. The session loop additionally pulls inbound
//! frames. WebSocket is the production implementation
//! ([`WsTransport`](crate::server::ws::WsTransport)).

use std::future::Future;

use bytes::Bytes;

use crate::error::TransportError;

/// Lifecycle state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Frames can be sent and received
    Open,
    /// A close has been initiated
    Closing,
    /// The transport is closed
    Closed,
}

/// Reason given when the server closes a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Orderly shutdown
    Normal,
    /// The peer broke the protocol (e.g. stopped sending heartbeats)
    PolicyViolation,
}

impl CloseReason {
    /// WebSocket close code for this reason
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::PolicyViolation => 1008,
        }
    }

    /// Human-readable description sent with the close frame
    pub fn description(&self) -> &'static str {
        match self {
            CloseReason::Normal => "Closing",
            CloseReason::PolicyViolation => "Heartbeat timeout",
        }
    }
}

/// Inbound frame from a peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text frame
    Text(String),
    /// Binary frame
    Binary(Bytes),
    /// Close frame or end of stream, with the peer's reason if any
    Close(Option<String>),
}

/// Bidirectional message channel to one device
pub trait Transport: Send + Sync + 'static {
    /// Send one text frame
    fn send(&self, payload: Bytes) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Wait for the next inbound frame
    ///
    /// Only the connection's session loop calls this.
    fn receive(&self) -> impl Future<Output = Result<Inbound, TransportError>> + Send;

    /// Close the transport
    fn close(&self, reason: CloseReason) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Current state
    fn state(&self) -> TransportState;

    /// Check if the transport is open
    fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport for tests

    use std::sync::{Arc, Mutex};

    use tokio::sync::{mpsc, Notify};

    use super::*;

    /// Records sent frames and closes; inbound frames are fed through a channel
    pub struct MockTransport {
        sent: Mutex<Vec<Bytes>>,
        closed_with: Mutex<Option<CloseReason>>,
        state: Mutex<TransportState>,
        fail_sends: bool,
        gate: Option<Arc<Notify>>,
        inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    }

    impl MockTransport {
        /// Create a transport and the sender used to feed it inbound frames
        pub fn new() -> (Self, mpsc::UnboundedSender<Inbound>) {
            Self::build(false, None)
        }

        /// Create a transport whose sends always fail
        pub fn failing() -> (Self, mpsc::UnboundedSender<Inbound>) {
            Self::build(true, None)
        }

        /// Create a transport whose sends wait until the returned gate is notified
        pub fn blocking() -> (Self, mpsc::UnboundedSender<Inbound>, Arc<Notify>) {
            let gate = Arc::new(Notify::new());
            let (transport, tx) = Self::build(false, Some(Arc::clone(&gate)));
            (transport, tx, gate)
        }

        fn build(
            fail_sends: bool,
            gate: Option<Arc<Notify>>,
        ) -> (Self, mpsc::UnboundedSender<Inbound>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let transport = Self {
                sent: Mutex::new(Vec::new()),
                closed_with: Mutex::new(None),
                state: Mutex::new(TransportState::Open),
                fail_sends,
                gate,
                inbound: tokio::sync::Mutex::new(rx),
            };
            (transport, tx)
        }

        pub fn sent(&self) -> Vec<Bytes> {
            self.sent.lock().unwrap().clone()
        }

        pub fn closed_with(&self) -> Option<CloseReason> {
            *self.closed_with.lock().unwrap()
        }

        pub fn set_state(&self, state: TransportState) {
            *self.state.lock().unwrap() = state;
        }
    }

    impl Transport for MockTransport {
        async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
            if self.fail_sends {
                return Err(TransportError::Send("mock failure".into()));
            }
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.sent.lock().unwrap().push(payload);
            Ok(())
        }

        async fn receive(&self) -> Result<Inbound, TransportError> {
            match self.inbound.lock().await.recv().await {
                Some(frame) => Ok(frame),
                None => Ok(Inbound::Close(None)),
            }
        }

        async fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
            *self.closed_with.lock().unwrap() = Some(reason);
            self.set_state(TransportState::Closed);
            Ok(())
        }

        fn state(&self) -> TransportState {
            *self.state.lock().unwrap()
        }
    }
}
