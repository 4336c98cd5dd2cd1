//! Client facade: register handlers, then connect over a transport.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sockio_settings::{DispatchMode, SockioSettings};
use sockio_transport::{Transport, TransportConfig};
use tracing::debug;

use crate::config::SessionConfig;
use crate::errors::Result;
use crate::handler::{AckBareHandler, AckHandler, BareHandler, EmitHandler, EventHandler, Handlers};
use crate::loops::SessionTasks;
use crate::overflow::{OverflowSet, OverflowSink};
use crate::session::Session;

/// Handler registry plus the session it is currently driving.
///
/// Handlers may be registered before or after connecting; every session
/// created by this client shares them.
pub struct Client {
    handlers: Arc<Handlers>,
    config: SessionConfig,
    transport_config: TransportConfig,
    overflow: Arc<dyn OverflowSink>,
    current: Mutex<Option<Session>>,
}

impl Client {
    /// Create a client with the given session configuration.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            handlers: Arc::new(Handlers::new()),
            config,
            transport_config: TransportConfig::default(),
            overflow: OverflowSet::global(),
            current: Mutex::new(None),
        }
    }

    /// Create a client configured from loaded settings.
    pub fn from_settings(settings: &SockioSettings) -> Self {
        let mut client = Self::new(SessionConfig::from(&settings.session));
        client.transport_config = TransportConfig::from(&settings.transport);
        client
    }

    /// Report backpressure to `sink` instead of the global overflow set.
    #[must_use]
    pub fn with_overflow_sink(mut self, sink: Arc<dyn OverflowSink>) -> Self {
        self.overflow = sink;
        self
    }

    /// Use `config` for transports opened by [`connect_url`](Self::connect_url).
    #[must_use]
    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Handle `method` with a closure taking decoded arguments.
    pub fn on<A, F, Fut>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(Session, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        A: DeserializeOwned + Send + 'static,
    {
        self.handlers.register(method, EmitHandler::<F, A>::new(f));
        self
    }

    /// Handle `method` with a closure that ignores arguments.
    pub fn on_bare<F, Fut>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handlers.register(method, BareHandler::new(f));
        self
    }

    /// Answer acknowledged requests for `method` with the closure's result.
    pub fn on_ack<A, R, F, Fut>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(Session, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.handlers.register(method, AckHandler::<F, A>::new(f));
        self
    }

    /// Answer acknowledged requests for `method` without reading arguments.
    pub fn on_ack_bare<R, F, Fut>(&self, method: &str, f: F) -> &Self
    where
        F: Fn(Session) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.handlers.register(method, AckBareHandler::new(f));
        self
    }

    /// Register a hand-written handler.
    pub fn on_handler(&self, method: &str, handler: impl EventHandler + 'static) -> &Self {
        self.handlers.register(method, handler);
        self
    }

    /// Run `hook` when a session completes its handshake.
    pub fn on_connect(&self, hook: impl Fn(&Session) + Send + Sync + 'static) -> &Self {
        self.handlers.set_on_connect(hook);
        self
    }

    /// Run `hook` when a session shuts down.
    pub fn on_disconnect(&self, hook: impl Fn(&Session) + Send + Sync + 'static) -> &Self {
        self.handlers.set_on_disconnect(hook);
        self
    }

    /// The handler registry shared by this client's sessions.
    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.handlers
    }

    // ── Connecting ──────────────────────────────────────────────────────

    /// Start a session over `transport` with concurrent dispatch.
    pub fn connect(&self, transport: impl Transport) -> Result<(Session, SessionTasks)> {
        self.start(Arc::new(transport), DispatchMode::Concurrent)
    }

    /// Start a session over `transport` with serialized dispatch.
    pub fn connect_serialized(&self, transport: impl Transport) -> Result<(Session, SessionTasks)> {
        self.start(Arc::new(transport), DispatchMode::Serialized)
    }

    /// Open a WebSocket to `url` and start a session over it, using the
    /// configured dispatch mode.
    pub async fn connect_url(&self, url: &str) -> Result<(Session, SessionTasks)> {
        let transport = sockio_transport::websocket::connect(url, self.transport_config.clone()).await?;
        self.start(Arc::new(transport), self.config.dispatch_mode)
    }

    fn start(&self, transport: Arc<dyn Transport>, mode: DispatchMode) -> Result<(Session, SessionTasks)> {
        let config = self.config.clone().with_dispatch_mode(mode);
        let handlers: Arc<Handlers> = Arc::clone(&self.handlers);
        let session = Session::with_overflow_sink(transport, handlers, config, Arc::clone(&self.overflow));
        let tasks = session.start()?;

        let previous = self.current.lock().replace(session.clone());
        if let Some(previous) = previous {
            debug!(previous = previous.key(), next = session.key(), "replacing active session");
            previous.close();
        }
        Ok((session, tasks))
    }

    /// The session most recently started by this client.
    pub fn session(&self) -> Option<Session> {
        self.current.lock().clone()
    }

    /// Close the current session, if any.
    pub fn close(&self) {
        let current = self.current.lock().take();
        if let Some(session) = current {
            session.close();
        }
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
