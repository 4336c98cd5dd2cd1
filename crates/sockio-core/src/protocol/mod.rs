//! Wire protocol: message model and text codec.

pub mod codec;
pub mod message;

pub use codec::{decode, encode};
pub use message::{CLOSE_FRAME, Message, MessageType, PING_FRAME, PONG_FRAME};
