//! Message: the unit of exchange between two peers.

use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, WsMuxError};
use crate::protocol::events::{
    ON_NAMESPACE_CONNECT, ON_NAMESPACE_DISCONNECT, ON_NATIVE_MESSAGE, ON_ROOM_JOIN, ON_ROOM_LEAVE,
};

/// A single protocol message.
///
/// Only `wait`, `namespace`, `room`, `event`, `err`, `is_noop` and `body`
/// are serialized. The remaining fields are local control flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Correlation token for ask/reply and handshake acks. Empty means
    /// fire-and-forget.
    pub wait: String,
    pub namespace: String,
    pub room: String,
    pub event: String,
    /// Opaque payload. Never escaped on the wire.
    pub body: Bytes,
    /// Error carried instead of the body.
    pub err: Option<WsMuxError>,
    /// Handshake acknowledgement that carries no new state.
    pub is_noop: bool,
    /// Set by the decoder for malformed frames.
    pub is_invalid: bool,

    /// Connection ID the message was received from (local only).
    pub from: String,
    /// Restrict a server broadcast to this connection ID (local only).
    pub to: String,
    /// Lifecycle event fired by a teardown rather than a handshake.
    pub is_forced: bool,
    /// Lifecycle event fired on the side that initiated it.
    pub is_local: bool,
    /// Raw frame outside the structured format.
    pub is_native: bool,
    /// Write as a binary frame instead of text.
    pub set_binary: bool,
}

impl Message {
    /// Fire-and-forget event on a namespace.
    pub fn new(namespace: impl Into<String>, event: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            namespace: namespace.into(),
            event: event.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Scope the message to a room.
    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = room.into();
        self
    }

    /// Raw payload that bypasses the structured format.
    pub fn native(body: impl Into<Bytes>) -> Self {
        Self {
            event: ON_NATIVE_MESSAGE.to_owned(),
            body: body.into(),
            is_native: true,
            ..Self::default()
        }
    }

    pub(crate) fn invalid() -> Self {
        Self {
            is_invalid: true,
            ..Self::default()
        }
    }

    /// Lifecycle message with an empty body.
    pub fn lifecycle(namespace: &str, room: &str, event: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            room: room.to_owned(),
            event: event.to_owned(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.err.is_some()
    }

    pub fn is_connect(&self) -> bool {
        self.event == ON_NAMESPACE_CONNECT
    }

    pub fn is_disconnect(&self) -> bool {
        self.event == ON_NAMESPACE_DISCONNECT
    }

    pub fn is_room_join(&self) -> bool {
        self.event == ON_ROOM_JOIN
    }

    pub fn is_room_leave(&self) -> bool {
        self.event == ON_ROOM_LEAVE
    }

    /// Build a message whose body is the JSON encoding of `value`.
    pub fn json<T: Serialize>(
        namespace: impl Into<String>,
        event: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        let body = serde_json::to_vec(value)
            .map_err(|e| WsMuxError::BadRequest(format!("json encode failed: {e}")))?;
        Ok(Self::new(namespace, event, body))
    }

    /// Decode the body as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| WsMuxError::BadRequest(format!("invalid json body: {e}")))
    }
}
