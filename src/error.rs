//! Error types
//!
//! A single crate-level error enum. Transport errors have their own type so
//! they can be reported per connection without dragging the rest along.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate error type
#[derive(Debug)]
pub enum Error {
    /// Requested record or payload does not exist
    NotFound(&'static str),
    /// Missing or unknown token / user key
    Unauthenticated(&'static str),
    /// Upload exceeds the caller's size limit
    PayloadTooLarge {
        /// Allowed size in bytes
        limit: u64,
        /// Declared or observed size in bytes
        actual: u64,
    },
    /// Malformed request (bad clipboard type, missing header, ...)
    InvalidRequest(String),
    /// I/O failure in the payload store
    Io(io::Error),
    /// Transport failure on a single connection
    Transport(TransportError),
    /// Serializing a notification or response failed
    Encode(serde_json::Error),
    /// Bad server setting
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::Unauthenticated(reason) => write!(f, "Unauthenticated: {}", reason),
            Error::PayloadTooLarge { limit, actual } => write!(
                f,
                "Payload too large: {} bytes (limit {} bytes)",
                actual, limit
            ),
            Error::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Encode(e) => write!(f, "Encoding error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Transport(e) => Some(e),
            Error::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encode(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

/// Error raised by a [`Transport`](crate::registry::Transport)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is no longer open
    Closed,
    /// Sending a frame failed
    Send(String),
    /// Receiving a frame failed
    Receive(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Transport closed"),
            TransportError::Send(msg) => write!(f, "Send failed: {}", msg),
            TransportError::Receive(msg) => write!(f, "Receive failed: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::PayloadTooLarge {
            limit: 1024,
            actual: 2048,
        };
        assert_eq!(
            err.to_string(),
            "Payload too large: 2048 bytes (limit 1024 bytes)"
        );

        let err = Error::from(TransportError::Closed);
        assert_eq!(err.to_string(), "Transport error: Transport closed");
    }

    #[test]
    fn test_io_source() {
        use std::error::Error as _;

        let err = Error::from(io::Error::new(io::ErrorKind::Other, "disk"));
        assert!(err.source().is_some());
        assert!(Error::NotFound("Record").source().is_none());
    }
}
