//! Structured protocol messages.

use std::fmt;

/// Pre-encoded Close frame.
pub const CLOSE_FRAME: &str = "1";
/// Pre-encoded Ping frame.
pub const PING_FRAME: &str = "2";
/// Pre-encoded Pong frame.
pub const PONG_FRAME: &str = "3";

/// Packet kind carried by a [`Message`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Handshake from the server, carries the [`Header`](crate::Header) JSON.
    Open,
    /// Connection closing.
    Close,
    /// Heartbeat request.
    Ping,
    /// Heartbeat reply.
    Pong,
    /// Empty message envelope (`40`).
    #[default]
    Empty,
    /// Fire-and-forget application event.
    Emit,
    /// Application event that expects a correlated reply.
    AckRequest,
    /// Reply to an [`MessageType::AckRequest`].
    AckResponse,
}

impl MessageType {
    /// Whether this kind is routed to application handlers.
    pub fn is_application(self) -> bool {
        matches!(self, Self::Emit | Self::AckRequest | Self::AckResponse)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Empty => "empty",
            Self::Emit => "emit",
            Self::AckRequest => "ack_request",
            Self::AckResponse => "ack_response",
        };
        f.write_str(name)
    }
}

/// One protocol message.
///
/// `ack_id` is only meaningful for [`MessageType::AckRequest`] and
/// [`MessageType::AckResponse`]; `method` only for [`MessageType::Emit`] and
/// [`MessageType::AckRequest`]. `args` is raw, already-encoded JSON that the
/// codec never re-parses. `source` holds the wire text a decoded message came
/// from and is empty for locally built messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Packet kind.
    pub kind: MessageType,
    /// Acknowledgment id.
    pub ack_id: u64,
    /// Event name.
    pub method: String,
    /// Raw JSON arguments.
    pub args: String,
    /// Original wire text.
    pub source: String,
}

impl Message {
    /// A bare message of the given kind.
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Fire-and-forget event with pre-encoded arguments.
    pub fn emit(method: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Emit,
            method: method.into(),
            args: args.into(),
            ..Self::default()
        }
    }

    /// Event expecting a reply correlated by `ack_id`.
    pub fn ack_request(ack_id: u64, method: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            kind: MessageType::AckRequest,
            ack_id,
            method: method.into(),
            args: args.into(),
            ..Self::default()
        }
    }

    /// Reply to the request with the same `ack_id`.
    pub fn ack_response(ack_id: u64, args: impl Into<String>) -> Self {
        Self {
            kind: MessageType::AckResponse,
            ack_id,
            args: args.into(),
            ..Self::default()
        }
    }

    /// Handshake packet carrying raw header JSON.
    pub fn open(header_json: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Open,
            args: header_json.into(),
            ..Self::default()
        }
    }
}
