//! Wire encoding and decoding.
//!
//! Frames are laid out as `<kind><sub-kind?><ack id?><payload?>`:
//!
//! ```text
//! 0{"sid":...}          open, raw handshake JSON
//! 1 / 2 / 3             close / ping / pong
//! 40                    empty envelope
//! 42["method",args]     emit
//! 42<id>["method",args] ack request
//! 43<id>[args]          ack response
//! ```
//!
//! `args` is always caller-encoded JSON and is copied verbatim in both
//! directions.

use super::message::{CLOSE_FRAME, Message, MessageType, PING_FRAME, PONG_FRAME};
use crate::errors::{DecodeError, EncodeError};

const EMPTY_FRAME: &str = "40";
const EVENT_PREFIX: &str = "42";
const REPLY_PREFIX: &str = "43";

/// Longest frame excerpt carried inside a [`DecodeError`].
const PREVIEW_CHARS: usize = 64;

/// Encode a message into its wire text.
pub fn encode(message: &Message) -> Result<String, EncodeError> {
    let frame = match message.kind {
        MessageType::Open => format!("0{}", message.args),
        MessageType::Close => CLOSE_FRAME.to_owned(),
        MessageType::Ping => PING_FRAME.to_owned(),
        MessageType::Pong => PONG_FRAME.to_owned(),
        MessageType::Empty => EMPTY_FRAME.to_owned(),
        MessageType::Emit => event_frame(EVENT_PREFIX, &message.method, &message.args)?,
        MessageType::AckRequest => event_frame(
            &format!("{EVENT_PREFIX}{}", message.ack_id),
            &message.method,
            &message.args,
        )?,
        MessageType::AckResponse => {
            format!("{REPLY_PREFIX}{}[{}]", message.ack_id, message.args)
        }
    };
    Ok(frame)
}

fn event_frame(prefix: &str, method: &str, args: &str) -> Result<String, EncodeError> {
    let method = serde_json::to_string(method)?;
    let mut frame = String::with_capacity(prefix.len() + method.len() + args.len() + 3);
    frame.push_str(prefix);
    frame.push('[');
    frame.push_str(&method);
    if !args.is_empty() {
        frame.push(',');
        frame.push_str(args);
    }
    frame.push(']');
    Ok(frame)
}

/// Frame shape selected by the leading digit(s).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Shape {
    Open,
    Close,
    Ping,
    Pong,
    Empty,
    /// `42`: emit or ack request, depending on the ack id.
    Event,
    /// `43`: ack response.
    Reply,
}

/// Decode one wire frame.
///
/// A request-shaped frame (`42`) whose ack id is missing or not a pure
/// digit run is accepted as a plain emit. Every other missing delimiter is
/// a hard error.
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    let shape = classify(frame)?;
    let mut message = Message {
        source: frame.to_owned(),
        ..Message::default()
    };

    match shape {
        Shape::Open => {
            message.kind = MessageType::Open;
            frame[1..].clone_into(&mut message.args);
        }
        Shape::Close => message.kind = MessageType::Close,
        Shape::Ping => message.kind = MessageType::Ping,
        Shape::Pong => message.kind = MessageType::Pong,
        Shape::Empty => message.kind = MessageType::Empty,
        Shape::Reply => {
            let (ack_id, rest) = split_ack_id(frame)?;
            let args = rest
                .strip_prefix('[')
                .and_then(|inner| inner.strip_suffix(']'))
                .ok_or_else(|| DecodeError::Unbracketed(preview(rest)))?;
            message.kind = MessageType::AckResponse;
            message.ack_id = ack_id;
            args.clone_into(&mut message.args);
        }
        Shape::Event => {
            let payload = if let Ok((ack_id, rest)) = split_ack_id(frame) {
                message.kind = MessageType::AckRequest;
                message.ack_id = ack_id;
                rest
            } else {
                message.kind = MessageType::Emit;
                &frame[2..]
            };
            let (method, args) = split_event(payload)?;
            message.method = method;
            args.clone_into(&mut message.args);
        }
    }

    Ok(message)
}

fn classify(frame: &str) -> Result<Shape, DecodeError> {
    let bytes = frame.as_bytes();
    let Some(&first) = bytes.first() else {
        return Err(DecodeError::Empty);
    };
    match first {
        b'0' => Ok(Shape::Open),
        b'1' => Ok(Shape::Close),
        b'2' => Ok(Shape::Ping),
        b'3' => Ok(Shape::Pong),
        b'4' => match bytes.get(1) {
            None => Err(DecodeError::Truncated(preview(frame))),
            Some(b'0') => Ok(Shape::Empty),
            Some(b'2') => Ok(Shape::Event),
            Some(b'3') => Ok(Shape::Reply),
            Some(_) => Err(DecodeError::UnknownType(preview(frame))),
        },
        _ => Err(DecodeError::UnknownType(preview(frame))),
    }
}

/// Split `4x<digits>[...` into the ack id and the bracketed remainder.
fn split_ack_id(frame: &str) -> Result<(u64, &str), DecodeError> {
    let body = &frame[2..];
    let Some(bracket) = body.find('[') else {
        return Err(DecodeError::Truncated(preview(frame)));
    };
    let digits = &body[..bracket];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::AckId(preview(frame)));
    }
    let ack_id = digits
        .parse::<u64>()
        .map_err(|_| DecodeError::AckId(preview(frame)))?;
    Ok((ack_id, &body[bracket..]))
}

/// Split `["method",args]` into the unescaped method and the raw args.
fn split_event(payload: &str) -> Result<(String, &str), DecodeError> {
    let inner = payload
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| DecodeError::Unbracketed(preview(payload)))?;

    let body = inner.trim_start();
    if !body.starts_with('"') {
        return Err(DecodeError::Method(preview(payload)));
    }
    let end = closing_quote(body).ok_or_else(|| DecodeError::Method(preview(payload)))?;
    let method: String = serde_json::from_str(&body[..=end])
        .map_err(|_| DecodeError::Method(preview(payload)))?;

    let after = body[end + 1..].trim_start();
    if after.is_empty() {
        return Ok((method, ""));
    }
    let args = after
        .strip_prefix(',')
        .ok_or_else(|| DecodeError::Separator(preview(payload)))?;
    Ok((method, args))
}

/// Byte index of the quote closing the string literal that opens `literal`.
fn closing_quote(literal: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, b) in literal.bytes().enumerate().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' => return Some(i),
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}
