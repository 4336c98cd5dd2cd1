//! Server-side transport for WebSockets upgraded through axum.

use axum::extract::ws::{Message, WebSocket};

use crate::TransportConfig;
use crate::websocket::{Incoming, WebSocketTransport, WsMessage};

impl WsMessage for Message {
    fn text(frame: String) -> Self {
        Message::Text(frame.into())
    }

    fn close() -> Self {
        Message::Close(None)
    }

    fn classify(self) -> Incoming {
        match self {
            Message::Text(text) => Incoming::Text(text.as_str().to_owned()),
            Message::Binary(_) => Incoming::Binary,
            Message::Close(Some(frame)) => Incoming::Close {
                code: Some(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
            Message::Close(None) => Incoming::Close {
                code: None,
                reason: String::new(),
            },
            Message::Ping(_) | Message::Pong(_) => Incoming::Control,
        }
    }
}

/// Transport over an axum WebSocket.
pub type AxumTransport = WebSocketTransport<WebSocket, Message>;

/// Wrap a socket handed over by `WebSocketUpgrade::on_upgrade`.
pub fn from_upgrade(socket: WebSocket, config: TransportConfig, peer: impl Into<String>) -> AxumTransport {
    WebSocketTransport::new(socket, config, peer)
}
