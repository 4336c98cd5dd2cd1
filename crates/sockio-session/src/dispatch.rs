//! Routing of inbound application messages to handlers.
//!
//! Shared by the serialized dispatch worker and the per-message tasks of
//! concurrent mode, plus inline reply delivery for the receive loop. Nothing
//! here can shut the session down: unknown methods, bad arguments and
//! unmatched replies are dropped and counted, and handler panics are
//! contained.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use metrics::counter;
use serde_json::Value;
use sockio_core::{Message, MessageType};
use tracing::{debug, error, warn};

use crate::errors::SessionError;
use crate::handler::{EventHandler, InvokeError};
use crate::metrics::{HANDLER_PANICS_TOTAL, MESSAGES_DROPPED_TOTAL};
use crate::session::Session;

/// Hand one inbound application message to its handler.
pub(crate) async fn dispatch(session: &Session, message: Message) {
    match message.kind {
        MessageType::Emit => on_emit(session, &message).await,
        MessageType::AckRequest => on_ack_request(session, &message).await,
        MessageType::AckResponse => deliver_reply(session, message),
        kind => debug!(session = session.key(), %kind, "not an application message"),
    }
}

async fn on_emit(session: &Session, message: &Message) {
    let Some(handler) = session.inner().handlers.lookup(&message.method) else {
        dropped(session, message, "no_handler");
        return;
    };
    let _ = invoke(session, handler, message).await;
}

/// What came out of one handler invocation.
enum Outcome {
    /// The handler ran; its reply value, if any.
    Completed(Option<Value>),
    /// The message was dropped or the handler failed.
    Abandoned,
}

async fn on_ack_request(session: &Session, message: &Message) {
    let Some(handler) = session.inner().handlers.lookup(&message.method) else {
        dropped(session, message, "no_handler");
        return;
    };
    if !handler.returns_value() {
        dropped(session, message, "no_return_value");
        return;
    }
    let Outcome::Completed(reply) = invoke(session, handler, message).await else {
        return;
    };

    let response = Message::ack_response(message.ack_id, "");
    let result = match reply {
        Some(value) => session.send(response, Some(&value)),
        None => session.send::<Value>(response, None),
    };
    match result {
        Ok(()) => {}
        Err(SessionError::Closed) => {
            debug!(session = session.key(), ack_id = message.ack_id, "session closed before reply");
        }
        Err(e) => warn!(
            session = session.key(),
            method = %message.method,
            ack_id = message.ack_id,
            error = %e,
            "acknowledgment reply not sent"
        ),
    }
}

/// Hand an acknowledgment reply to its waiter. Never blocks.
pub(crate) fn deliver_reply(session: &Session, message: Message) {
    let ack_id = message.ack_id;
    if !session.inner().acks.resolve(ack_id, message.args) {
        counter!(MESSAGES_DROPPED_TOTAL, "reason" => "unmatched_ack").increment(1);
        debug!(session = session.key(), ack_id, "reply for unknown or abandoned request");
    }
}

/// Run a handler with panics contained.
async fn invoke(session: &Session, handler: Arc<dyn EventHandler>, message: &Message) -> Outcome {
    // Handlers without an argument never see the payload.
    let args = if handler.takes_args() { message.args.as_str() } else { "" };
    let outcome = AssertUnwindSafe(handler.invoke(session.clone(), args))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(reply)) => Outcome::Completed(reply),
        Ok(Err(InvokeError::Args(e))) => {
            debug!(session = session.key(), method = %message.method, error = %e, "argument decode failed");
            dropped(session, message, "bad_args");
            Outcome::Abandoned
        }
        Ok(Err(e)) => {
            warn!(session = session.key(), method = %message.method, error = %e, "handler failed");
            Outcome::Abandoned
        }
        Err(panic) => {
            counter!(HANDLER_PANICS_TOTAL).increment(1);
            error!(
                session = session.key(),
                method = %message.method,
                panic = %panic_message(panic.as_ref()),
                "handler panicked"
            );
            Outcome::Abandoned
        }
    }
}

fn dropped(session: &Session, message: &Message, reason: &'static str) {
    counter!(MESSAGES_DROPPED_TOTAL, "reason" => reason).increment(1);
    debug!(
        session = session.key(),
        method = %message.method,
        kind = %message.kind,
        reason,
        "message dropped"
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
