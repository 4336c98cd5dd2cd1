//! Codec and handshake error types.

use thiserror::Error;

/// Errors produced while decoding a wire frame.
///
/// Every variant is fatal to the session that received the frame: a frame
/// that cannot be classified leaves the conversation in an unknown state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame was empty.
    #[error("empty frame")]
    Empty,
    /// The leading type digit(s) did not name a known packet.
    #[error("unknown message type in frame {0:?}")]
    UnknownType(String),
    /// The frame is shorter than its packet type requires.
    #[error("truncated frame {0:?}")]
    Truncated(String),
    /// An acknowledgment id was required but missing or not a digit run.
    #[error("missing or malformed ack id in frame {0:?}")]
    AckId(String),
    /// The payload array was not wrapped in `[` ... `]`.
    #[error("payload is not a bracketed array: {0:?}")]
    Unbracketed(String),
    /// The method name literal was missing, unterminated or invalid JSON.
    #[error("malformed method name in payload {0:?}")]
    Method(String),
    /// The method literal was followed by something other than `,` or `]`.
    #[error("missing separator after method name in payload {0:?}")]
    Separator(String),
}

/// Errors produced while encoding a message.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The method name could not be JSON-escaped.
    #[error("failed to encode method name: {0}")]
    Method(#[from] serde_json::Error),
}

/// Errors produced while parsing the handshake payload of an Open packet.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// The Open packet carried no payload.
    #[error("open packet carried no handshake payload")]
    Missing,
    /// The handshake payload was not valid header JSON.
    #[error("malformed handshake payload: {0}")]
    Json(#[from] serde_json::Error),
}
