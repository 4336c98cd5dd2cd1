//! # sockio-core
//!
//! Foundation of the sockio protocol engine:
//!
//! - [`protocol`]: the [`Message`] model and the byte-exact text codec
//!   ([`encode`] / [`decode`])
//! - [`Header`]: handshake metadata carried by the Open packet
//! - [`errors`]: codec and handshake error types
//! - [`logging`]: `tracing` subscriber setup shared by binaries and tests

#![deny(unsafe_code)]

pub mod errors;
pub mod header;
pub mod logging;
pub mod protocol;

pub use errors::{DecodeError, EncodeError, HeaderError};
pub use header::Header;
pub use protocol::{Message, MessageType, decode, encode};
