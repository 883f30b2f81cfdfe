//! Text wire format (panic-free).
//!
//! Layout, seven fields joined by `;`:
//!
//! ```text
//! wait;namespace;room;event;isError;isNoOp;body-or-error
//! ```
//!
//! - `namespace`, `room` and `event` have `;` replaced by a placeholder.
//! - The last field is never escaped. Splitting is bounded to seven parts so
//!   separators inside the body survive verbatim.
//! - With an error set, the last field carries the error text.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::WsMuxError;
use crate::protocol::message::Message;

/// Field separator.
pub const SEPARATOR: u8 = b';';

/// Placeholder substituted for the separator inside name fields.
pub const SEPARATOR_ESCAPE: &str = "@%!semicolon@%!";

const FIELD_COUNT: usize = 7;
const TRUE_FLAG: &[u8] = b"1";
const FALSE_FLAG: &[u8] = b"0";

/// Replace separators in a name field.
pub fn escape(s: &str) -> Cow<'_, str> {
    if s.as_bytes().contains(&SEPARATOR) {
        Cow::Owned(s.replace(';', SEPARATOR_ESCAPE))
    } else {
        Cow::Borrowed(s)
    }
}

/// Reverse [`escape`].
pub fn unescape(s: &str) -> Cow<'_, str> {
    if s.contains(SEPARATOR_ESCAPE) {
        Cow::Owned(s.replace(SEPARATOR_ESCAPE, ";"))
    } else {
        Cow::Borrowed(s)
    }
}

fn flag(v: bool) -> &'static [u8] {
    if v {
        TRUE_FLAG
    } else {
        FALSE_FLAG
    }
}

/// Encode a message.
///
/// A native message without a wait token is written as its raw body.
pub fn serialize(msg: &Message) -> Bytes {
    if msg.is_native && msg.wait.is_empty() {
        return msg.body.clone();
    }

    let err_text = msg.err.as_ref().map(WsMuxError::to_string);
    let tail: &[u8] = match &err_text {
        Some(text) => text.as_bytes(),
        None => &msg.body,
    };

    let namespace = escape(&msg.namespace);
    let room = escape(&msg.room);
    let event = escape(&msg.event);

    let mut buf = BytesMut::with_capacity(
        msg.wait.len() + namespace.len() + room.len() + event.len() + tail.len() + 10,
    );
    buf.put_slice(msg.wait.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(namespace.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(room.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(event.as_bytes());
    buf.put_u8(SEPARATOR);
    buf.put_slice(flag(err_text.is_some()));
    buf.put_u8(SEPARATOR);
    buf.put_slice(flag(msg.is_noop));
    buf.put_u8(SEPARATOR);
    buf.put_slice(tail);
    buf.freeze()
}

/// Decode a frame.
///
/// Never fails: malformed input comes back with `is_invalid` set. When
/// `allow_native` is true, input that is not a structured message becomes a
/// native message carrying the whole frame as its body.
pub fn deserialize(data: Bytes, allow_native: bool) -> Message {
    if data.is_empty() {
        return Message::invalid();
    }

    let parts: Vec<&[u8]> = data.splitn(FIELD_COUNT, |b| *b == SEPARATOR).collect();
    if parts.len() != FIELD_COUNT {
        if allow_native {
            return Message::native(data);
        }
        return Message::invalid();
    }

    let (Some(wait), Some(namespace), Some(room), Some(event)) = (
        text_field(parts[0]),
        text_field(parts[1]),
        text_field(parts[2]),
        text_field(parts[3]),
    ) else {
        return Message::invalid();
    };

    let is_error = parts[4] == TRUE_FLAG;
    let is_noop = parts[5] == TRUE_FLAG;
    let tail = parts[6];
    let body = data.slice(data.len() - tail.len()..);

    let mut msg = Message {
        wait: wait.to_owned(),
        namespace: unescape(namespace).into_owned(),
        room: unescape(room).into_owned(),
        event: unescape(event).into_owned(),
        is_noop,
        ..Message::default()
    };

    if is_error {
        msg.err = Some(WsMuxError::from_text(&String::from_utf8_lossy(&body)));
    } else {
        msg.body = body;
    }
    msg
}

fn text_field(raw: &[u8]) -> Option<&str> {
    std::str::from_utf8(raw).ok()
}
