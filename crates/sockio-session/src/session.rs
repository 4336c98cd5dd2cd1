//! Per-connection session state and the public session operations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use sockio_core::{Header, Message, encode};
use sockio_settings::DispatchMode;
use sockio_transport::Transport;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ack::AckRegistry;
use crate::config::SessionConfig;
use crate::errors::{Result, SessionError, ShutdownCause};
use crate::handler::HandlerLookup;
use crate::loops::{self, Outbound, SessionTasks};
use crate::metrics::{ACK_TIMEOUTS_TOTAL, SEND_OVERFLOWS_TOTAL, SESSIONS_CLOSED_TOTAL, SESSIONS_OPENED_TOTAL};
use crate::overflow::{OverflowSet, OverflowSink};
use crate::queue::{BoundedQueue, PushError};

static NEXT_SESSION_KEY: AtomicU64 = AtomicU64::new(1);

/// One logical conversation over one transport.
///
/// Cheap to clone; every clone refers to the same session. A session is
/// alive from construction until its first shutdown and is never revived.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

pub(crate) struct SessionInner {
    key: u64,
    transport: Arc<dyn Transport>,
    pub(crate) inbound: BoundedQueue<Message>,
    pub(crate) outbound: BoundedQueue<Outbound>,
    header: OnceLock<Header>,
    alive: Mutex<bool>,
    cause: Mutex<Option<ShutdownCause>>,
    started: AtomicBool,
    pub(crate) acks: AckRegistry,
    config: SessionConfig,
    pub(crate) handlers: Arc<dyn HandlerLookup>,
    pub(crate) overflow: Arc<dyn OverflowSink>,
    pub(crate) dispatch_limit: Option<Arc<Semaphore>>,
    closed: CancellationToken,
}

impl Session {
    /// Create a session reporting backpressure to [`OverflowSet::global`].
    ///
    /// Performs no I/O; call [`start`](Self::start) to run the loops.
    pub fn new(
        transport: Arc<dyn Transport>,
        handlers: Arc<dyn HandlerLookup>,
        config: SessionConfig,
    ) -> Self {
        Self::with_overflow_sink(transport, handlers, config, OverflowSet::global())
    }

    /// Create a session reporting backpressure to `overflow`.
    pub fn with_overflow_sink(
        transport: Arc<dyn Transport>,
        handlers: Arc<dyn HandlerLookup>,
        config: SessionConfig,
        overflow: Arc<dyn OverflowSink>,
    ) -> Self {
        let key = NEXT_SESSION_KEY.fetch_add(1, Ordering::Relaxed);
        let dispatch_limit = match config.dispatch_mode {
            DispatchMode::Concurrent => config
                .max_concurrent_dispatch
                .map(|n| Arc::new(Semaphore::new(n.max(1)))),
            DispatchMode::Serialized => None,
        };
        debug!(session = key, peer = %transport.describe(), "session created");
        counter!(SESSIONS_OPENED_TOTAL).increment(1);

        Self {
            inner: Arc::new(SessionInner {
                key,
                inbound: BoundedQueue::new(config.queue_capacity),
                outbound: BoundedQueue::new(config.queue_capacity),
                transport,
                header: OnceLock::new(),
                alive: Mutex::new(true),
                cause: Mutex::new(None),
                started: AtomicBool::new(false),
                acks: AckRegistry::new(),
                config,
                handlers,
                overflow,
                dispatch_limit,
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Spawn the receive, send and keepalive loops, plus the dispatch
    /// worker in serialized mode. Must be called inside a Tokio runtime.
    pub fn start(&self) -> Result<SessionTasks> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Err(SessionError::AlreadyStarted);
        }
        Ok(loops::spawn(self))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Process-unique key, used in logs and the overflow set.
    pub fn key(&self) -> u64 {
        self.inner.key
    }

    /// Server-assigned session id, empty until the handshake completes.
    pub fn id(&self) -> String {
        self.inner.header.get().map(|h| h.sid.clone()).unwrap_or_default()
    }

    /// Handshake header, once received.
    pub fn header(&self) -> Option<&Header> {
        self.inner.header.get()
    }

    /// Whether the session has not yet shut down.
    pub fn is_alive(&self) -> bool {
        *self.inner.alive.lock()
    }

    /// Why the session shut down, if it has.
    pub fn shutdown_cause(&self) -> Option<ShutdownCause> {
        self.inner.cause.lock().clone()
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Dispatch mode.
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.config.dispatch_mode
    }

    /// Frames waiting in the outbound queue.
    pub fn outbound_len(&self) -> usize {
        self.inner.outbound.len()
    }

    /// Messages waiting for the serialized dispatch worker.
    pub fn inbound_len(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Acknowledged requests still waiting for a reply.
    pub fn pending_acks(&self) -> usize {
        self.inner.acks.len()
    }

    /// Description of the underlying transport.
    pub fn peer(&self) -> String {
        self.inner.transport.describe()
    }

    /// Completes once the session has shut down.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.inner.transport.as_ref()
    }

    pub(crate) fn inner(&self) -> &SessionInner {
        &self.inner
    }

    pub(crate) fn close_token(&self) -> &CancellationToken {
        &self.inner.closed
    }

    /// Heartbeat interval: negotiated by the handshake, else the
    /// transport's default.
    pub(crate) fn ping_interval(&self) -> Duration {
        self.header()
            .and_then(Header::negotiated_ping_interval)
            .unwrap_or_else(|| self.inner.transport.keepalive_params().interval)
    }

    /// Store the handshake header. Returns `false` if one was already set.
    pub(crate) fn set_header(&self, header: Header) -> bool {
        self.inner.header.set(header).is_ok()
    }

    // ── Sending ─────────────────────────────────────────────────────────

    /// Send an event with arguments.
    pub fn emit<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<()> {
        self.send(Message::emit(method, ""), Some(args))
    }

    /// Send an event without arguments.
    pub fn emit_bare(&self, method: &str) -> Result<()> {
        self.send::<()>(Message::emit(method, ""), None)
    }

    /// Send an acknowledged request and wait for the peer's reply.
    ///
    /// Returns the reply's raw JSON arguments. On timeout the pending entry
    /// is removed and [`SessionError::AckTimeout`] returned; if the session
    /// shuts down first, [`SessionError::Closed`].
    pub async fn ack<A: Serialize + ?Sized>(
        &self,
        method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<String> {
        if !self.is_alive() {
            return Err(SessionError::Closed);
        }
        let (id, reply) = self.inner.acks.register();
        if let Err(e) = self.send(Message::ack_request(id, method, ""), Some(args)) {
            let _ = self.inner.acks.remove(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(args)) => Ok(args),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                let _ = self.inner.acks.remove(id);
                counter!(ACK_TIMEOUTS_TOTAL).increment(1);
                debug!(session = self.key(), ack_id = id, method, ?timeout, "acknowledgment timed out");
                Err(SessionError::AckTimeout(timeout))
            }
        }
    }

    /// [`ack`](Self::ack) with the configured default deadline.
    pub async fn request<A: Serialize + ?Sized>(&self, method: &str, args: &A) -> Result<String> {
        self.ack(method, args, self.inner.config.ack_timeout).await
    }

    /// Encode `message` and queue it without blocking.
    ///
    /// `args`, when given, is serialized to JSON and replaces the message
    /// arguments. Fails with [`SessionError::BufferOverflow`] when the
    /// outbound queue is full and [`SessionError::Closed`] after shutdown;
    /// the queue is untouched on any failure.
    pub fn send<A: Serialize + ?Sized>(&self, mut message: Message, args: Option<&A>) -> Result<()> {
        if !self.is_alive() {
            return Err(SessionError::Closed);
        }
        if let Some(args) = args {
            message.args = serde_json::to_string(args).map_err(SessionError::Args)?;
        }
        let frame = encode(&message)?;
        self.enqueue(frame, message.kind.to_string())
    }

    /// Queue a pre-encoded control frame, logging instead of failing.
    pub(crate) fn enqueue_control(&self, frame: &str) {
        match self.enqueue(frame.to_owned(), "control".to_owned()) {
            Ok(()) => {}
            Err(SessionError::Closed) => {}
            Err(e) => warn!(session = self.key(), frame, error = %e, "control frame not queued"),
        }
    }

    fn enqueue(&self, frame: String, kind: String) -> Result<()> {
        match self.inner.outbound.try_push(Outbound::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(PushError::Full(Outbound::Frame(frame))) => {
                counter!(SEND_OVERFLOWS_TOTAL, "kind" => kind).increment(1);
                debug!(session = self.key(), frame = %frame, "outbound queue full");
                Err(SessionError::BufferOverflow)
            }
            Err(_) => Err(SessionError::Closed),
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────────

    /// Close the session. Safe to call repeatedly and concurrently.
    pub fn close(&self) {
        let _ = self.shutdown(ShutdownCause::Local);
    }

    /// Tear the session down exactly once.
    ///
    /// Unsent outbound frames are discarded. Inbound messages already queued
    /// for a serialized session are still handed to their handlers by the
    /// dispatch worker, which exits once the queue is empty.
    ///
    /// Returns `true` for the call that performed the teardown and `false`
    /// for every later call, which has no side effects.
    pub fn shutdown(&self, cause: ShutdownCause) -> bool {
        let inner = &self.inner;
        let discarded = {
            let mut alive = inner.alive.lock();
            if !*alive {
                return false;
            }
            *alive = false;
            *inner.cause.lock() = Some(cause.clone());

            inner.transport.close();
            inner.inbound.close();
            let discarded = inner.outbound.drain().len();
            inner.outbound.force_push(Outbound::Stop);
            inner.outbound.close();
            inner.closed.cancel();
            discarded
        };

        let abandoned = inner.acks.fail_all();
        counter!(SESSIONS_CLOSED_TOTAL, "cause" => cause.label()).increment(1);
        if cause.is_clean() {
            info!(session = inner.key, sid = %self.id(), %cause, discarded, abandoned, "session closed");
        } else {
            warn!(session = inner.key, sid = %self.id(), %cause, discarded, abandoned, "session failed");
        }

        let hook = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            inner.handlers.on_disconnection(self);
        }));
        if hook.is_err() {
            warn!(session = inner.key, "disconnect hook panicked");
        }
        inner.overflow.clear(inner.key);
        true
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.inner.key)
            .field("sid", &self.id())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
