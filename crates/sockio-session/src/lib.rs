//! # sockio-session
//!
//! The per-connection session engine.
//!
//! A [`Session`] owns one [`Transport`](sockio_transport::Transport), two
//! bounded queues, the handshake [`Header`](sockio_core::Header) and an
//! [`AckRegistry`]. Starting it spawns the cooperating loops:
//!
//! - **receive**: reads frames, answers pings, records the handshake and
//!   routes application messages
//! - **send**: drains the outbound queue in FIFO order and reports
//!   backpressure to an [`OverflowSink`]
//! - **keepalive**: queues a ping every negotiated interval
//! - **dispatch worker**: serialized mode only, runs handlers in order
//!
//! The first loop to see a failure calls [`Session::shutdown`], which tears
//! everything down exactly once.
//!
//! [`Client`] is a convenience layer that owns a handler registry and
//! starts sessions over any transport.

#![deny(unsafe_code)]

pub mod ack;
pub mod client;
pub mod config;
mod dispatch;
pub mod errors;
pub mod handler;
mod loops;
pub mod metrics;
pub mod overflow;
pub mod queue;
pub mod session;

pub use ack::AckRegistry;
pub use client::Client;
pub use config::SessionConfig;
pub use errors::{Result, SessionError, ShutdownCause};
pub use handler::{AckBareHandler, AckHandler, BareHandler, EmitHandler, EventHandler, HandlerLookup, Handlers, InvokeError};
pub use loops::SessionTasks;
pub use overflow::{OverflowSet, OverflowSink};
pub use queue::{BoundedQueue, PushError};
pub use session::Session;
pub use sockio_settings::DispatchMode;
