//! Receive loop: transport frames in, protocol handling and routing out.

use std::sync::Arc;

use metrics::counter;
use sockio_core::protocol::PONG_FRAME;
use sockio_core::{Header, Message, MessageType, decode};
use sockio_settings::DispatchMode;
use tracing::{Instrument, Span, debug, info, trace, warn};

use crate::dispatch::{deliver_reply, dispatch};
use crate::errors::{Result, SessionError, ShutdownCause};
use crate::metrics::FRAMES_RECEIVED_TOTAL;
use crate::session::Session;

pub(crate) async fn run(session: Session) -> Result<()> {
    debug!("receive loop started");
    let result = receive(&session).await;
    debug!(ok = result.is_ok(), "receive loop finished");
    result
}

async fn receive(session: &Session) -> Result<()> {
    loop {
        let frame = match session.transport().receive_frame().await {
            Ok(frame) => frame,
            Err(e) if e.is_expected_closure() => {
                debug!(error = %e, "transport closed");
                let _ = session.shutdown(ShutdownCause::PeerClosed);
                return Ok(());
            }
            Err(e) => {
                let _ = session.shutdown(ShutdownCause::Transport(e.to_string()));
                return Err(e.into());
            }
        };
        counter!(FRAMES_RECEIVED_TOTAL).increment(1);
        trace!(frame = %frame, "frame received");

        let message = match decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                let _ = session.shutdown(ShutdownCause::Protocol(e.to_string()));
                return Err(e.into());
            }
        };

        match message.kind {
            MessageType::Open => on_open(session, &message)?,
            MessageType::Close => {
                debug!("peer sent close packet");
                let _ = session.shutdown(ShutdownCause::PeerClosed);
                return Ok(());
            }
            MessageType::Ping => session.enqueue_control(PONG_FRAME),
            MessageType::Pong | MessageType::Empty => {}
            // Replies bypass the dispatch path so a handler awaiting one
            // cannot starve it.
            MessageType::AckResponse => deliver_reply(session, message),
            MessageType::Emit | MessageType::AckRequest => {
                if !route(session, message).await {
                    return Ok(());
                }
            }
        }
    }
}

fn on_open(session: &Session, message: &Message) -> Result<()> {
    let header = match Header::from_handshake(&message.args) {
        Ok(header) => header,
        Err(e) => {
            let _ = session.shutdown(ShutdownCause::Handshake(e.to_string()));
            return Err(SessionError::Handshake(e));
        }
    };
    let sid = header.sid.clone();
    let ping_interval = header.ping_interval;
    if !session.set_header(header) {
        warn!(sid, "duplicate handshake ignored");
        return Ok(());
    }
    info!(sid, ?ping_interval, "handshake complete");

    let inner = session.inner();
    let hook = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        inner.handlers.on_connection(session);
    }));
    if hook.is_err() {
        warn!(sid = %session.id(), "connect hook panicked");
    }
    Ok(())
}

/// Hand an application message to the dispatch path.
///
/// Returns `false` once the session has shut down underneath us.
async fn route(session: &Session, message: Message) -> bool {
    match session.dispatch_mode() {
        DispatchMode::Serialized => session.inner().inbound.push(message).await.is_ok(),
        DispatchMode::Concurrent => {
            let permit = match &session.inner().dispatch_limit {
                Some(limit) => {
                    let acquired = tokio::select! {
                        () = session.close_token().cancelled() => return false,
                        permit = Arc::clone(limit).acquire_owned() => permit,
                    };
                    match acquired {
                        Ok(permit) => Some(permit),
                        Err(_) => return false,
                    }
                }
                None => None,
            };
            let task_session = session.clone();
            drop(tokio::spawn(
                async move {
                    dispatch(&task_session, message).await;
                    drop(permit);
                }
                .instrument(Span::current()),
            ));
            true
        }
    }
}
