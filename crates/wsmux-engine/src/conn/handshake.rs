//! Inbound routing and the responder half of every handshake.
//!
//! Runs on the connection's dispatch task, one message at a time. Every
//! intent that carries a wait token gets exactly one reply: the confirmed
//! event, a no-op ack for state that is already committed, or an error.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tracing::{debug, trace};

use wsmux_core::error::WsMuxError;
use wsmux_core::protocol::events::{
    is_lifecycle_event, ON_NAMESPACE_CONNECTED, ON_NAMESPACE_DISCONNECT, ON_ROOM_JOINED,
    ON_ROOM_LEFT,
};
use wsmux_core::Message;

use super::connection::Route;
use super::{Conn, NSConn};

pub(crate) fn handle_inbound(conn: &Conn, msg: Message) -> BoxFuture<'_, ()> {
    async move {
        if msg.is_native {
            match conn.namespace("") {
                Some(ns) => dispatch_event(conn, ns, msg).await,
                None => trace!(conn = %conn.id(), "native message without native namespace"),
            }
            return;
        }

        if msg.is_connect() {
            reply_connect(conn, msg).await;
            return;
        }

        match conn.route(msg) {
            Route::Queued => {}
            Route::Ready(ns, msg) => {
                if msg.is_disconnect() {
                    reply_disconnect(conn, ns, msg).await;
                } else if msg.is_room_join() {
                    reply_room_join(conn, ns, msg).await;
                } else if msg.is_room_leave() {
                    reply_room_leave(conn, ns, msg).await;
                } else if is_lifecycle_event(&msg.event) {
                    trace!(conn = %conn.id(), event = %msg.event, "unsolicited lifecycle event dropped");
                } else {
                    dispatch_event(conn, ns, msg).await;
                }
            }
            Route::Missing(msg) => {
                if msg.is_disconnect() {
                    if is_request(&msg) {
                        conn.send(&ack(&msg, ON_NAMESPACE_DISCONNECT)).await;
                    }
                } else if msg.is_room_join() || msg.is_room_leave() {
                    if is_request(&msg) {
                        conn.send(&error_reply(&msg, WsMuxError::BadNamespace)).await;
                    }
                } else {
                    trace!(conn = %conn.id(), namespace = %msg.namespace, event = %msg.event, "message for unconnected namespace dropped");
                }
            }
        }
    }
    .boxed()
}

/// Run a user event handler and answer asks.
async fn dispatch_event(conn: &Conn, ns: NSConn, msg: Message) {
    let template = Message {
        wait: msg.wait.clone(),
        namespace: msg.namespace.clone(),
        room: msg.room.clone(),
        event: msg.event.clone(),
        is_native: msg.is_native,
        set_binary: msg.set_binary,
        ..Message::default()
    };

    match ns.events().fire(ns.clone(), msg).await {
        Ok(Some(body)) => {
            let reply = Message { body, ..template };
            conn.send(&reply).await;
        }
        Ok(None) => {
            if !template.wait.is_empty() {
                conn.send(&template).await;
            }
        }
        Err(e) => {
            conn.metrics()
                .handler_errors
                .inc(&[("code", e.code().as_str())]);
            debug!(conn = %conn.id(), namespace = %template.namespace, event = %template.event, error = %e, "event handler failed");
            conn.report_error(&e);
            if !template.wait.is_empty() {
                conn.send(&Message {
                    err: Some(e),
                    ..template
                })
                .await;
            }
        }
    }
}

async fn reply_connect(conn: &Conn, msg: Message) {
    if !is_request(&msg) {
        return;
    }

    if conn.namespace(&msg.namespace).is_some() {
        conn.count_handshake("connect", "noop");
        conn.send(&noop(&msg)).await;
        return;
    }

    let Some(events) = conn.namespaces().get(&msg.namespace) else {
        conn.count_handshake("connect", "bad_namespace");
        conn.send(&error_reply(&msg, WsMuxError::BadNamespace)).await;
        return;
    };

    let ns = NSConn::new(conn.clone(), &msg.namespace, events);
    if let Err(e) = ns.events().fire(ns.clone(), msg.clone()).await {
        conn.count_handshake("connect", "rejected");
        conn.send(&error_reply(&msg, e)).await;
        return;
    }

    let (ns, queued, inserted) = conn.commit_namespace(ns);
    if !inserted {
        conn.count_handshake("connect", "noop");
        conn.send(&noop(&msg)).await;
    } else {
        conn.count_handshake("connect", "ok");
        conn.subscribe(&msg.namespace).await;
        conn.send(&ack(&msg, ON_NAMESPACE_CONNECTED)).await;

        let connected = confirmed(&msg, ON_NAMESPACE_CONNECTED);
        if let Err(e) = ns.events().fire(ns.clone(), connected).await {
            conn.report_error(&e);
        }
    }

    for queued in queued {
        handle_inbound(conn, queued).await;
    }
}

async fn reply_disconnect(conn: &Conn, ns: NSConn, msg: Message) {
    if !is_request(&msg) {
        return;
    }

    // A client cannot refuse a server-initiated disconnect.
    if !conn.is_client() {
        if let Err(e) = ns.events().fire(ns.clone(), msg.clone()).await {
            conn.count_handshake("disconnect", "rejected");
            conn.send(&error_reply(&msg, e)).await;
            return;
        }
    }

    ns.force_leave_all(false).await;
    conn.remove_namespace(&msg.namespace);
    conn.unsubscribe(&msg.namespace).await;
    conn.count_handshake("disconnect", "ok");
    conn.send(&ack(&msg, ON_NAMESPACE_DISCONNECT)).await;

    if conn.is_client() {
        if let Err(e) = ns.events().fire(ns.clone(), msg).await {
            conn.report_error(&e);
        }
    }
}

async fn reply_room_join(conn: &Conn, ns: NSConn, msg: Message) {
    if !is_request(&msg) {
        return;
    }

    if ns.has_room(&msg.room) {
        conn.count_handshake("join", "noop");
        conn.send(&noop(&msg)).await;
        return;
    }

    if let Err(e) = ns.events().fire(ns.clone(), msg.clone()).await {
        conn.count_handshake("join", "rejected");
        conn.send(&error_reply(&msg, e)).await;
        return;
    }

    ns.add_room(&msg.room);
    conn.count_handshake("join", "ok");
    conn.send(&ack(&msg, ON_ROOM_JOINED)).await;

    if let Err(e) = ns.events().fire(ns.clone(), confirmed(&msg, ON_ROOM_JOINED)).await {
        conn.report_error(&e);
    }
}

async fn reply_room_leave(conn: &Conn, ns: NSConn, msg: Message) {
    if !is_request(&msg) {
        return;
    }

    if !ns.has_room(&msg.room) {
        conn.count_handshake("leave", "noop");
        conn.send(&noop(&msg)).await;
        return;
    }

    if let Err(e) = ns.events().fire(ns.clone(), msg.clone()).await {
        conn.count_handshake("leave", "rejected");
        conn.send(&error_reply(&msg, e)).await;
        return;
    }

    ns.remove_room(&msg.room);
    conn.count_handshake("leave", "ok");
    conn.send(&ack(&msg, ON_ROOM_LEFT)).await;

    if let Err(e) = ns.events().fire(ns.clone(), confirmed(&msg, ON_ROOM_LEFT)).await {
        conn.report_error(&e);
    }
}

/// Intents without a wait token (or acks echoed back) need no answer.
fn is_request(msg: &Message) -> bool {
    !msg.wait.is_empty() && !msg.is_noop
}

fn ack(msg: &Message, event: &str) -> Message {
    let mut reply = Message::lifecycle(&msg.namespace, &msg.room, event);
    reply.wait.clone_from(&msg.wait);
    reply
}

fn noop(msg: &Message) -> Message {
    let mut reply = ack(msg, &msg.event);
    reply.is_noop = true;
    reply
}

fn error_reply(msg: &Message, err: WsMuxError) -> Message {
    let mut reply = ack(msg, &msg.event);
    reply.err = Some(err);
    reply
}

/// The confirmed event fired locally on the responder.
fn confirmed(msg: &Message, event: &str) -> Message {
    let mut fired = Message::lifecycle(&msg.namespace, &msg.room, event);
    fired.from.clone_from(&msg.from);
    fired
}
