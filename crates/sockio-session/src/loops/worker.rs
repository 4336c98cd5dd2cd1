//! Serialized dispatch worker: handles inbound messages one at a time, in
//! arrival order. Exits when the inbound queue is closed.

use tracing::debug;

use crate::dispatch::dispatch;
use crate::session::Session;

pub(crate) async fn run(session: Session) {
    debug!("dispatch worker started");
    while let Some(message) = session.inner().inbound.pop().await {
        dispatch(&session, message).await;
    }
    debug!("dispatch worker finished");
}
