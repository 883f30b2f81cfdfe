//! Reserved event names.
//!
//! The four intent events (`connect`, `disconnect`, `room join`,
//! `room leave`) travel on the wire and drive the handshake state machine.
//! The confirmed events are fired locally on each side once state commits.

pub const ON_NAMESPACE_CONNECT: &str = "_OnNamespaceConnect";
pub const ON_NAMESPACE_CONNECTED: &str = "_OnNamespaceConnected";
pub const ON_NAMESPACE_DISCONNECT: &str = "_OnNamespaceDisconnect";
pub const ON_ROOM_JOIN: &str = "_OnRoomJoin";
pub const ON_ROOM_JOINED: &str = "_OnRoomJoined";
pub const ON_ROOM_LEAVE: &str = "_OnRoomLeave";
pub const ON_ROOM_LEFT: &str = "_OnRoomLeft";

/// Catch-all handler consulted when no exact event handler exists.
pub const ON_ANY_EVENT: &str = "_OnAnyEvent";

/// Synthetic event carried by raw, unstructured frames.
pub const ON_NATIVE_MESSAGE: &str = "_OnNativeMessage";

/// True for the seven namespace/room lifecycle events.
pub fn is_lifecycle_event(event: &str) -> bool {
    matches!(
        event,
        ON_NAMESPACE_CONNECT
            | ON_NAMESPACE_CONNECTED
            | ON_NAMESPACE_DISCONNECT
            | ON_ROOM_JOIN
            | ON_ROOM_JOINED
            | ON_ROOM_LEAVE
            | ON_ROOM_LEFT
    )
}
