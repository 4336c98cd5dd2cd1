//! Send loop: drains the outbound queue to the transport in FIFO order and
//! reports the queue's fill level for backpressure.

use metrics::counter;
use tracing::{debug, trace, warn};

use crate::errors::{Result, SessionError, ShutdownCause};
use crate::metrics::FRAMES_SENT_TOTAL;
use crate::session::Session;

/// Item carried by the outbound queue.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outbound {
    /// An encoded frame.
    Frame(String),
    /// Ends the send loop.
    Stop,
}

/// Backpressure state implied by a fill level.
#[derive(Debug, PartialEq, Eq)]
enum Fill {
    Normal,
    High,
    Overflowing,
}

fn classify(len: usize, capacity: usize) -> Fill {
    if len + 1 >= capacity {
        Fill::Overflowing
    } else if len > capacity / 2 {
        Fill::High
    } else {
        Fill::Normal
    }
}

pub(crate) async fn run(session: Session) -> Result<()> {
    debug!("send loop started");
    let result = send(&session).await;
    debug!(ok = result.is_ok(), "send loop finished");
    result
}

async fn send(session: &Session) -> Result<()> {
    let inner = session.inner();
    let queue = &inner.outbound;
    let capacity = queue.capacity();
    let key = session.key();
    let mut marked = false;

    loop {
        let len = queue.len();
        match classify(len, capacity) {
            Fill::Overflowing => {
                warn!(len, capacity, "outbound queue overflow");
                let _ = session.shutdown(ShutdownCause::Overflow);
                return Err(SessionError::BufferOverflow);
            }
            Fill::High if !marked => {
                inner.overflow.mark(key);
                marked = true;
            }
            Fill::Normal if marked => {
                inner.overflow.clear(key);
                marked = false;
            }
            Fill::High | Fill::Normal => {}
        }

        let frame = match queue.pop().await {
            Some(Outbound::Frame(frame)) => frame,
            Some(Outbound::Stop) | None => return Ok(()),
        };

        if let Err(e) = session.transport().send_frame(&frame).await {
            if e.is_expected_closure() {
                debug!(error = %e, "transport closed while sending");
                let _ = session.shutdown(ShutdownCause::PeerClosed);
                return Ok(());
            }
            let _ = session.shutdown(ShutdownCause::Transport(e.to_string()));
            return Err(e.into());
        }
        counter!(FRAMES_SENT_TOTAL).increment(1);
        trace!(frame = %frame, "frame sent");
    }
}
