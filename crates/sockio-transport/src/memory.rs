//! In-process transport pair.
//!
//! Frames written on one end are read on the other. Closing either end
//! drops its sender, so the peer's next receive reports an expected
//! closure once buffered frames are drained.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::errors::{Result, TransportError};
use crate::{KeepaliveParams, Transport};

/// One end of an in-memory transport pair.
pub struct MemoryTransport {
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    closed: CancellationToken,
    keepalive: KeepaliveParams,
    label: &'static str,
}

impl MemoryTransport {
    /// Create a connected pair. Both ends advertise `keepalive`.
    pub fn pair(keepalive: KeepaliveParams) -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = Self::new(a_tx, b_rx, keepalive, "memory:a");
        let b = Self::new(b_tx, a_rx, keepalive, "memory:b");
        (a, b)
    }

    fn new(
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
        keepalive: KeepaliveParams,
        label: &'static str,
    ) -> Self {
        Self {
            outgoing: Mutex::new(Some(tx)),
            incoming: AsyncMutex::new(rx),
            closed: CancellationToken::new(),
            keepalive,
            label,
        }
    }

    /// Whether this end has been closed locally.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn receive_frame(&self) -> Result<String> {
        let mut rx = tokio::select! {
            () = self.closed.cancelled() => return Err(TransportError::closed()),
            guard = self.incoming.lock() => guard,
        };
        tokio::select! {
            () = self.closed.cancelled() => Err(TransportError::closed()),
            frame = rx.recv() => match frame {
                Some(frame) if frame.is_empty() => Err(TransportError::EmptyFrame),
                Some(frame) => Ok(frame),
                None => Err(TransportError::closed()),
            },
        }
    }

    async fn send_frame(&self, frame: &str) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TransportError::closed());
        }
        let tx = self.outgoing.lock().clone().ok_or_else(TransportError::closed)?;
        tx.send(frame.to_owned()).map_err(|_| TransportError::closed())
    }

    fn close(&self) {
        self.closed.cancel();
        drop(self.outgoing.lock().take());
    }

    fn keepalive_params(&self) -> KeepaliveParams {
        self.keepalive
    }

    fn describe(&self) -> String {
        self.label.to_string()
    }
}
