//! The cooperating per-session loops.
//!
//! Every session runs a receive loop, a send loop and a keepalive loop;
//! serialized sessions add a dispatch worker. Each loop runs in its own
//! task inside a span carrying the session key. Whichever loop first sees
//! a failure calls [`Session::shutdown`]; the others notice and exit.

mod keepalive;
mod outbound;
mod receive;
mod worker;

use sockio_settings::DispatchMode;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info_span};

use crate::errors::{Result, SessionError};
use crate::session::Session;

pub(crate) use outbound::Outbound;

/// Join handles for a running session's loops.
#[derive(Debug)]
pub struct SessionTasks {
    receive: JoinHandle<Result<()>>,
    send: JoinHandle<Result<()>>,
    keepalive: JoinHandle<()>,
    worker: Option<JoinHandle<()>>,
}

impl SessionTasks {
    /// Wait for every loop to exit.
    ///
    /// Returns the error that ended the session, if a loop reported one:
    /// the receive loop's takes precedence over the send loop's.
    pub async fn join(self) -> Result<()> {
        let receive = flatten("receive", self.receive.await);
        let send = flatten("send", self.send.await);
        if let Err(e) = self.keepalive.await {
            error!(error = %e, "keepalive loop aborted");
        }
        if let Some(worker) = self.worker {
            if let Err(e) = worker.await {
                error!(error = %e, "dispatch worker aborted");
            }
        }
        receive.and(send)
    }

    /// Whether every loop has exited.
    pub fn is_finished(&self) -> bool {
        self.receive.is_finished()
            && self.send.is_finished()
            && self.keepalive.is_finished()
            && self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

fn flatten(name: &str, joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) => {
            error!(loop_name = name, error = %e, "session loop aborted");
            Err(SessionError::Closed)
        }
    }
}

/// Spawn the loops for `session`.
pub(crate) fn spawn(session: &Session) -> SessionTasks {
    let span = info_span!("session", key = session.key());

    let receive = tokio::spawn(receive::run(session.clone()).instrument(span.clone()));
    let send = tokio::spawn(outbound::run(session.clone()).instrument(span.clone()));
    let keepalive = tokio::spawn(keepalive::run(session.clone()).instrument(span.clone()));
    let worker = match session.dispatch_mode() {
        DispatchMode::Serialized => Some(tokio::spawn(worker::run(session.clone()).instrument(span))),
        DispatchMode::Concurrent => None,
    };

    SessionTasks {
        receive,
        send,
        keepalive,
        worker,
    }
}
