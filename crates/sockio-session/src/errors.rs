//! Session error and shutdown cause types.

use std::fmt;
use std::time::Duration;

use sockio_core::{DecodeError, EncodeError, HeaderError};
use sockio_transport::TransportError;
use thiserror::Error;

/// Errors returned by session operations and loops.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An inbound frame could not be decoded.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    /// The Open packet carried an unusable handshake.
    #[error("invalid handshake: {0}")]
    Handshake(#[from] HeaderError),
    /// An outbound message could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] EncodeError),
    /// Arguments could not be serialized to JSON.
    #[error("failed to serialize arguments: {0}")]
    Args(#[source] serde_json::Error),
    /// The outbound queue is full.
    #[error("outbound buffer overflow")]
    BufferOverflow,
    /// No acknowledgment arrived before the deadline.
    #[error("no acknowledgment within {0:?}")]
    AckTimeout(Duration),
    /// The session has shut down.
    #[error("session closed")]
    Closed,
    /// The session's loops were already started.
    #[error("session already started")]
    AlreadyStarted,
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The application called `close`.
    Local,
    /// The peer closed the connection in an orderly way.
    PeerClosed,
    /// The transport failed.
    Transport(String),
    /// The peer sent a frame that does not decode.
    Protocol(String),
    /// The handshake header was invalid.
    Handshake(String),
    /// The outbound queue filled up.
    Overflow,
}

impl ShutdownCause {
    /// Stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::PeerClosed => "peer_closed",
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Handshake(_) => "handshake",
            Self::Overflow => "overflow",
        }
    }

    /// Whether the session ended without a fault.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Local | Self::PeerClosed)
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("closed locally"),
            Self::PeerClosed => f.write_str("closed by peer"),
            Self::Transport(e) => write!(f, "transport failure: {e}"),
            Self::Protocol(e) => write!(f, "protocol violation: {e}"),
            Self::Handshake(e) => write!(f, "handshake failure: {e}"),
            Self::Overflow => f.write_str("outbound buffer overflow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_is_transparent() {
        let err = SessionError::from(TransportError::BinaryFrame);
        assert_eq!(err.to_string(), "binary frames are not supported");
    }

    #[test]
    fn decode_error_converts() {
        let err = SessionError::from(DecodeError::Empty);
        assert!(matches!(err, SessionError::Decode(DecodeError::Empty)));
    }

    #[test]
    fn cause_labels_and_cleanliness() {
        assert_eq!(ShutdownCause::Overflow.label(), "overflow");
        assert!(ShutdownCause::Local.is_clean());
        assert!(ShutdownCause::PeerClosed.is_clean());
        assert!(!ShutdownCause::Protocol("x".into()).is_clean());
        assert_eq!(
            ShutdownCause::Transport("reset".into()).to_string(),
            "transport failure: reset"
        );
    }
}
