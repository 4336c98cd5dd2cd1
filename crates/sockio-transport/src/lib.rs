//! # sockio-transport
//!
//! Frame transports for sockio sessions.
//!
//! A [`Transport`] moves whole text frames. It knows nothing about the
//! packet grammar carried inside them; the session engine encodes and
//! decodes on either side of it.
//!
//! - [`MemoryTransport`]: an in-process pair for tests and embedding
//! - [`WebSocketTransport`]: any split-able WebSocket stream, with
//!   [`websocket::connect`] for tungstenite clients and, behind the `axum`
//!   feature, an adapter for server-side upgrades

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod websocket;

#[cfg(feature = "axum")]
pub mod axum;

use std::time::Duration;

use async_trait::async_trait;
use sockio_settings::TransportSettings;

pub use errors::{Result, TransportError};
pub use memory::MemoryTransport;
pub use websocket::{Incoming, TungsteniteTransport, WebSocketTransport, WsMessage};

/// Default heartbeat interval before a handshake negotiates one.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default heartbeat timeout before a handshake negotiates one.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(60);

/// Heartbeat parameters a transport advertises to the keepalive loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeepaliveParams {
    /// Delay between outbound pings.
    pub interval: Duration,
    /// How long the peer tolerates silence.
    pub timeout: Duration,
}

impl Default for KeepaliveParams {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Runtime transport configuration, resolved from settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// Heartbeat advertised before the handshake.
    pub keepalive: KeepaliveParams,
    /// Maximum wait for one inbound frame.
    pub receive_timeout: Duration,
    /// Maximum wait for one outbound write.
    pub send_timeout: Duration,
    /// Largest accepted message, in bytes.
    pub max_message_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&TransportSettings::default())
    }
}

impl From<&TransportSettings> for TransportConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            keepalive: KeepaliveParams {
                interval: settings.ping_interval(),
                timeout: settings.ping_timeout(),
            },
            receive_timeout: settings.receive_timeout(),
            send_timeout: settings.send_timeout(),
            max_message_size: settings.max_message_size,
        }
    }
}

/// A bidirectional carrier of text frames.
///
/// `receive_frame` is only ever called from one task at a time, and so is
/// `send_frame`; the two may run concurrently with each other. `close` must
/// be safe to call repeatedly and from any thread, and must wake a pending
/// `receive_frame` with a [`TransportError::Closed`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Wait for the next text frame.
    async fn receive_frame(&self) -> Result<String>;

    /// Write one text frame.
    async fn send_frame(&self, frame: &str) -> Result<()>;

    /// Close the connection. Idempotent.
    fn close(&self);

    /// Heartbeat parameters to use until the handshake supplies its own.
    fn keepalive_params(&self) -> KeepaliveParams;

    /// Short human-readable description of the peer, for logs.
    fn describe(&self) -> String;
}
