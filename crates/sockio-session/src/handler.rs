//! Application handler capability.
//!
//! Sessions look handlers up by method name through [`HandlerLookup`].
//! Each handler is an [`EventHandler`] descriptor that declares whether it
//! takes arguments and whether it produces a reply. Typed closures are
//! wrapped by [`EmitHandler`], [`BareHandler`], [`AckHandler`] and
//! [`AckBareHandler`] at registration time; [`Handlers`] is the stock
//! registry.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::session::Session;

/// Failure while invoking a handler.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The raw arguments did not decode into the handler's argument type.
    #[error("invalid arguments: {0}")]
    Args(#[source] serde_json::Error),
    /// The handler's return value did not serialize.
    #[error("unserializable reply: {0}")]
    Reply(#[source] serde_json::Error),
    /// The handler reported its own failure.
    #[error("{0}")]
    Handler(String),
}

/// A callable bound to one method name.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Whether the handler consumes the message arguments.
    fn takes_args(&self) -> bool;

    /// Whether the handler produces a value that answers an `AckRequest`.
    fn returns_value(&self) -> bool;

    /// Run the handler on the raw JSON arguments of a message.
    async fn invoke(&self, session: Session, args: &str) -> Result<Option<Value>, InvokeError>;
}

/// Resolves method names to handlers and receives lifecycle events.
pub trait HandlerLookup: Send + Sync {
    /// Handler registered for `method`, if any.
    fn lookup(&self, method: &str) -> Option<Arc<dyn EventHandler>>;

    /// The handshake completed.
    fn on_connection(&self, _session: &Session) {}

    /// The session shut down.
    fn on_disconnection(&self, _session: &Session) {}
}

// ── Typed adapters ──────────────────────────────────────────────────────────

/// Handler taking decoded arguments and returning nothing.
pub struct EmitHandler<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> EmitHandler<F, A> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, A> EventHandler for EmitHandler<F, A>
where
    F: Fn(Session, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
{
    fn takes_args(&self) -> bool {
        true
    }

    fn returns_value(&self) -> bool {
        false
    }

    async fn invoke(&self, session: Session, args: &str) -> Result<Option<Value>, InvokeError> {
        let args: A = serde_json::from_str(args).map_err(InvokeError::Args)?;
        (self.f)(session, args).await;
        Ok(None)
    }
}

/// Handler that ignores arguments and returns nothing.
pub struct BareHandler<F> {
    f: F,
}

impl<F> BareHandler<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> EventHandler for BareHandler<F>
where
    F: Fn(Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn takes_args(&self) -> bool {
        false
    }

    fn returns_value(&self) -> bool {
        false
    }

    async fn invoke(&self, session: Session, _args: &str) -> Result<Option<Value>, InvokeError> {
        (self.f)(session).await;
        Ok(None)
    }
}

/// Handler taking decoded arguments and returning a reply.
pub struct AckHandler<F, A> {
    f: F,
    _args: PhantomData<fn(A)>,
}

impl<F, A> AckHandler<F, A> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _args: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, A, R> EventHandler for AckHandler<F, A>
where
    F: Fn(Session, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn takes_args(&self) -> bool {
        true
    }

    fn returns_value(&self) -> bool {
        true
    }

    async fn invoke(&self, session: Session, args: &str) -> Result<Option<Value>, InvokeError> {
        let args: A = serde_json::from_str(args).map_err(InvokeError::Args)?;
        let reply = (self.f)(session, args).await;
        serde_json::to_value(reply).map(Some).map_err(InvokeError::Reply)
    }
}

/// Handler that ignores arguments and returns a reply.
pub struct AckBareHandler<F> {
    f: F,
}

impl<F> AckBareHandler<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut, R> EventHandler for AckBareHandler<F>
where
    F: Fn(Session) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn takes_args(&self) -> bool {
        false
    }

    fn returns_value(&self) -> bool {
        true
    }

    async fn invoke(&self, session: Session, _args: &str) -> Result<Option<Value>, InvokeError> {
        let reply = (self.f)(session).await;
        serde_json::to_value(reply).map(Some).map_err(InvokeError::Reply)
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

type SystemHook = Arc<dyn Fn(&Session) + Send + Sync>;

/// Registry mapping method names to handlers, plus lifecycle hooks.
///
/// Registration may happen at any time; sessions see the registry as it is
/// when each message is dispatched.
#[derive(Default)]
pub struct Handlers {
    methods: RwLock<HashMap<String, Arc<dyn EventHandler>>>,
    on_connect: RwLock<Option<SystemHook>>,
    on_disconnect: RwLock<Option<SystemHook>>,
}

impl Handlers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method name, replacing any previous one.
    pub fn register(&self, method: &str, handler: impl EventHandler + 'static) {
        let _ = self.methods.write().insert(method.to_owned(), Arc::new(handler));
    }

    /// Remove the handler for a method name.
    pub fn unregister(&self, method: &str) -> bool {
        self.methods.write().remove(method).is_some()
    }

    /// Set the hook fired when a handshake completes.
    pub fn set_on_connect(&self, hook: impl Fn(&Session) + Send + Sync + 'static) {
        *self.on_connect.write() = Some(Arc::new(hook));
    }

    /// Set the hook fired when a session shuts down.
    pub fn set_on_disconnect(&self, hook: impl Fn(&Session) + Send + Sync + 'static) {
        *self.on_disconnect.write() = Some(Arc::new(hook));
    }

    /// Registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.read().contains_key(method)
    }
}

impl HandlerLookup for Handlers {
    fn lookup(&self, method: &str) -> Option<Arc<dyn EventHandler>> {
        self.methods.read().get(method).cloned()
    }

    fn on_connection(&self, session: &Session) {
        // Clone out so the hook runs without the lock held.
        let hook = self.on_connect.read().clone();
        if let Some(hook) = hook {
            hook(session);
        }
    }

    fn on_disconnection(&self, session: &Session) {
        let hook = self.on_disconnect.read().clone();
        if let Some(hook) = hook {
            hook(session);
        }
    }
}
