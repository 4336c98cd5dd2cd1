//! Keepalive loop: queues a ping every interval until the session dies.
//!
//! Never shuts the session down; a ping that does not fit in the outbound
//! queue is logged and skipped.

use sockio_core::protocol::PING_FRAME;
use tracing::{debug, trace};

use crate::session::Session;

pub(crate) async fn run(session: Session) {
    debug!("keepalive loop started");
    loop {
        let interval = session.ping_interval();
        tokio::select! {
            () = session.close_token().cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
        if !session.is_alive() {
            break;
        }
        trace!(?interval, "sending ping");
        session.enqueue_control(PING_FRAME);
    }
    debug!("keepalive loop finished");
}
