//! WebSocket transport.
//!
//! [`WebSocketTransport`] is generic over any WebSocket that can be split
//! into a sink and a stream. Each half sits behind its own async mutex so
//! the receive loop and the send loop never contend. Only text frames are
//! carried; control frames are skipped and binary frames are rejected.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{Result, TransportError};
use crate::{KeepaliveParams, Transport, TransportConfig};

/// What a received WebSocket message means to the transport.
#[derive(Debug, PartialEq, Eq)]
pub enum Incoming {
    /// A text frame.
    Text(String),
    /// A binary frame.
    Binary,
    /// A close frame, with the peer's code and reason when present.
    Close {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// Ping, pong or a raw frame; skipped.
    Control,
}

/// Abstraction over WebSocket message types, so one transport serves both
/// tungstenite clients and axum upgrades.
pub trait WsMessage: Sized + Send + Sync + 'static {
    /// Build a text message.
    fn text(frame: String) -> Self;

    /// Build a close message.
    fn close() -> Self;

    /// Classify a received message.
    fn classify(self) -> Incoming;
}

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
            Message::Close(frame) => match frame {
                Some(frame) => Incoming::Close {
                    code: Some(u16::from(frame.code)),
                    reason: frame.reason.as_str().to_owned(),
                },
                None => Incoming::Close {
                    code: None,
                    reason: String::new(),
                },
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Incoming::Control,
        }
    }
}

/// WebSocket-backed [`Transport`].
pub struct WebSocketTransport<WS, M> {
    inner: Arc<Inner<WS, M>>,
}

impl<WS, M> std::fmt::Debug for WebSocketTransport<WS, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("peer", &self.inner.peer)
            .finish_non_exhaustive()
    }
}

struct Inner<WS, M> {
    sink: AsyncMutex<SplitSink<WS, M>>,
    stream: AsyncMutex<SplitStream<WS>>,
    closed: CancellationToken,
    config: TransportConfig,
    peer: String,
}

/// Transport over a `tokio-tungstenite` stream.
pub type TungsteniteTransport<S = MaybeTlsStream<TcpStream>> =
    WebSocketTransport<WebSocketStream<S>, Message>;

impl<WS, M> WebSocketTransport<WS, M>
where
    WS: Stream + Sink<M> + Send + 'static,
    M: WsMessage,
{
    /// Wrap an established WebSocket.
    pub fn new(ws: WS, config: TransportConfig, peer: impl Into<String>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            inner: Arc::new(Inner {
                sink: AsyncMutex::new(sink),
                stream: AsyncMutex::new(stream),
                closed: CancellationToken::new(),
                config,
                peer: peer.into(),
            }),
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

#[async_trait]
impl<WS, M, E> Transport for WebSocketTransport<WS, M>
where
    WS: Stream<Item = std::result::Result<M, E>> + Sink<M> + Unpin + Send + 'static,
    <WS as Sink<M>>::Error: Display + Send,
    E: Display + Send + Sync + 'static,
    M: WsMessage,
{
    async fn receive_frame(&self) -> Result<String> {
        let inner = &self.inner;
        let mut stream = tokio::select! {
            () = inner.closed.cancelled() => return Err(TransportError::closed()),
            guard = inner.stream.lock() => guard,
        };
        let limit = inner.config.receive_timeout;

        loop {
            let next = tokio::select! {
                () = inner.closed.cancelled() => return Err(TransportError::closed()),
                next = tokio::time::timeout(limit, stream.next()) => next,
            };
            let message = match next {
                Err(_) => return Err(TransportError::ReceiveTimeout(limit)),
                Ok(None) => return Err(TransportError::closed()),
                Ok(Some(Err(e))) => return Err(TransportError::WebSocket(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };
            match message.classify() {
                Incoming::Text(text) if text.is_empty() => return Err(TransportError::EmptyFrame),
                Incoming::Text(text) if text.len() > inner.config.max_message_size => {
                    return Err(TransportError::FrameTooLarge {
                        size: text.len(),
                        limit: inner.config.max_message_size,
                    });
                }
                Incoming::Text(text) => return Ok(text),
                Incoming::Binary => return Err(TransportError::BinaryFrame),
                Incoming::Close { code, reason } => {
                    debug!(peer = %inner.peer, ?code, %reason, "peer sent close frame");
                    return Err(TransportError::Closed { code, reason });
                }
                Incoming::Control => {}
            }
        }
    }

    async fn send_frame(&self, frame: &str) -> Result<()> {
        let inner = &self.inner;
        if inner.closed.is_cancelled() {
            return Err(TransportError::closed());
        }
        let limit = inner.config.send_timeout;
        let mut sink = inner.sink.lock().await;
        match tokio::time::timeout(limit, sink.send(M::text(frame.to_owned()))).await {
            Err(_) => Err(TransportError::SendTimeout(limit)),
            Ok(Err(e)) => Err(TransportError::WebSocket(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }

    fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();

        // Best-effort close handshake; without a runtime the socket is
        // simply dropped with the transport.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        drop(handle.spawn(async move {
            let mut sink = inner.sink.lock().await;
            if let Err(e) = sink.send(M::close()).await {
                debug!(peer = %inner.peer, error = %e, "close frame not delivered");
            }
            if let Err(e) = sink.close().await {
                debug!(peer = %inner.peer, error = %e, "websocket close failed");
            }
        }));
    }

    fn keepalive_params(&self) -> KeepaliveParams {
        self.inner.config.keepalive
    }

    fn describe(&self) -> String {
        self.inner.peer.clone()
    }
}

/// Connect to a `ws://` URL.
///
/// TLS is not enabled in this build, so `wss://` URLs fail with
/// [`TransportError::Connect`]. Inbound frames larger than
/// `config.max_message_size` are rejected by [`Transport::receive_frame`].
pub async fn connect(url: &str, config: TransportConfig) -> Result<TungsteniteTransport> {
    let (ws, response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| {
            warn!(url, error = %e, "websocket connect failed");
            TransportError::Connect {
                url: url.to_owned(),
                message: e.to_string(),
            }
        })?;

    debug!(url, status = %response.status(), "websocket connected");
    Ok(WebSocketTransport::new(ws, config, url))
}

/// Wrap a server-side stream that has already completed the handshake.
pub fn from_stream<S>(
    ws: WebSocketStream<S>,
    config: TransportConfig,
    peer: impl Into<String>,
) -> TungsteniteTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    WebSocketTransport::new(ws, config, peer)
}

/// Duplex-backed transport, as produced by [`pair`].
pub type DuplexTransport = TungsteniteTransport<tokio::io::DuplexStream>;

/// Connected client/server pair over an in-memory duplex pipe.
pub async fn pair(config: TransportConfig) -> Result<(DuplexTransport, DuplexTransport)> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client, server) = tokio::join!(
        tokio_tungstenite::client_async("ws://localhost/", client_io),
        tokio_tungstenite::accept_async(server_io),
    );
    let (client, _) = client.map_err(|e| TransportError::WebSocket(e.to_string()))?;
    let server = server.map_err(|e| TransportError::WebSocket(e.to_string()))?;
    Ok((
        from_stream(client, config.clone(), "duplex:client"),
        from_stream(server, config, "duplex:server"),
    ))
}
