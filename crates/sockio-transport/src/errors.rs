//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// WebSocket close codes that mean the peer went away on purpose.
const EXPECTED_CLOSE_CODES: [u16; 3] = [
    1000, // normal closure
    1001, // going away
    1005, // no status received
];

/// Errors raised by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection is closed, locally or by the peer.
    #[error("connection closed{}", close_detail(*.code, .reason))]
    Closed {
        /// Close code sent by the peer, if any.
        code: Option<u16>,
        /// Close reason sent by the peer.
        reason: String,
    },
    /// No frame arrived within the receive timeout.
    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),
    /// A frame could not be written within the send timeout.
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),
    /// The peer sent a binary frame; only text frames are supported.
    #[error("binary frames are not supported")]
    BinaryFrame,
    /// The peer sent a frame larger than the configured limit.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Received size in bytes.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },
    /// The peer sent an empty text frame.
    #[error("empty frame received")]
    EmptyFrame,
    /// The underlying WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(String),
    /// Establishing the connection failed.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying failure.
        message: String,
    },
}

impl TransportError {
    /// A closure without a peer-supplied code.
    pub fn closed() -> Self {
        Self::Closed {
            code: None,
            reason: String::new(),
        }
    }

    /// Whether this error is an orderly end of the conversation rather
    /// than a failure: a local close, the stream ending, or a peer close
    /// with a normal, going-away or no-status code.
    pub fn is_expected_closure(&self) -> bool {
        match self {
            Self::Closed { code: None, .. } => true,
            Self::Closed {
                code: Some(code), ..
            } => EXPECTED_CLOSE_CODES.contains(code),
            _ => false,
        }
    }
}

fn close_detail(code: Option<u16>, reason: &str) -> String {
    match (code, reason.is_empty()) {
        (None, _) => String::new(),
        (Some(code), true) => format!(" (code {code})"),
        (Some(code), false) => format!(" (code {code}: {reason})"),
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
