use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::debug;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::protocol::events::{
    ON_NAMESPACE_DISCONNECT, ON_ROOM_JOIN, ON_ROOM_JOINED, ON_ROOM_LEAVE, ON_ROOM_LEFT,
};
use wsmux_core::Message;

use super::connection::outcome_of;
use super::{read, write, Conn, Room};
use crate::ctx::Ctx;
use crate::dispatch::Events;

struct NsInner {
    conn: Conn,
    namespace: String,
    events: Arc<Events>,
    rooms: RwLock<HashSet<String>>,
}

/// A connected namespace. Exists only after a committed connect handshake.
#[derive(Clone)]
pub struct NSConn {
    inner: Arc<NsInner>,
}

impl std::fmt::Debug for NSConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NSConn")
            .field("conn", &self.inner.conn.id())
            .field("namespace", &self.inner.namespace)
            .finish()
    }
}

impl NSConn {
    pub(crate) fn new(conn: Conn, namespace: &str, events: Arc<Events>) -> Self {
        Self {
            inner: Arc::new(NsInner {
                conn,
                namespace: namespace.to_owned(),
                events,
                rooms: RwLock::new(HashSet::new()),
            }),
        }
    }

    pub fn conn(&self) -> &Conn {
        &self.inner.conn
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn events(&self) -> &Arc<Events> {
        &self.inner.events
    }

    /// Fire-and-forget event on this namespace.
    pub async fn emit(&self, event: &str, body: impl Into<Bytes>) -> bool {
        self.inner
            .conn
            .write(Message::new(self.namespace(), event, body))
            .await
    }

    /// Same as [`NSConn::emit`] but written as a binary frame.
    pub async fn emit_binary(&self, event: &str, body: impl Into<Bytes>) -> bool {
        let mut msg = Message::new(self.namespace(), event, body);
        msg.set_binary = true;
        self.inner.conn.write(msg).await
    }

    pub async fn ask(&self, ctx: &Ctx, event: &str, body: impl Into<Bytes>) -> Result<Message> {
        self.inner
            .conn
            .ask(ctx, Message::new(self.namespace(), event, body))
            .await
    }

    /// Join a room (handshake initiator). The local `_OnRoomJoin` handler
    /// can refuse before anything is sent.
    pub async fn join_room(&self, ctx: &Ctx, room: &str) -> Result<Room> {
        let conn = &self.inner.conn;
        let _guard = conn.lock_process(self.namespace(), room).await;

        if self.has_room(room) {
            return Ok(Room::new(self.clone(), room));
        }

        let mut local = Message::lifecycle(self.namespace(), room, ON_ROOM_JOIN);
        local.is_local = true;
        if let Err(e) = self.inner.events.fire(self.clone(), local).await {
            conn.count_handshake("join", "rejected");
            return Err(e);
        }

        let intent = Message::lifecycle(self.namespace(), room, ON_ROOM_JOIN);
        if let Err(e) = conn.ask_raw(ctx, intent).await {
            conn.count_handshake("join", outcome_of(&e));
            return Err(e);
        }

        self.add_room(room);
        conn.count_handshake("join", "ok");
        let mut joined = Message::lifecycle(self.namespace(), room, ON_ROOM_JOINED);
        joined.is_local = true;
        if let Err(e) = self.inner.events.fire(self.clone(), joined).await {
            conn.report_error(&e);
        }
        Ok(Room::new(self.clone(), room))
    }

    /// Handle to a joined room.
    pub fn room(&self, name: &str) -> Option<Room> {
        self.has_room(name).then(|| Room::new(self.clone(), name))
    }

    pub fn rooms(&self) -> Vec<Room> {
        let mut names: Vec<String> = read(&self.inner.rooms).iter().cloned().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| Room::new(self.clone(), &name))
            .collect()
    }

    /// Leave a joined room by name. `BadRoom` when it is not joined.
    pub async fn leave_room(&self, ctx: &Ctx, room: &str) -> Result<()> {
        match self.room(room) {
            Some(room) => room.leave(ctx).await,
            None => Err(WsMuxError::BadRoom),
        }
    }

    /// Leave every joined room; stops at the first failure.
    pub async fn leave_all(&self, ctx: &Ctx) -> Result<()> {
        for room in self.rooms() {
            room.leave(ctx).await?;
        }
        Ok(())
    }

    /// Disconnect the namespace (handshake initiator). An error from the
    /// local `_OnNamespaceDisconnect` handler is returned after the
    /// namespace is already gone on both sides.
    pub async fn disconnect(&self, ctx: &Ctx) -> Result<()> {
        let conn = &self.inner.conn;
        let _guard = conn.lock_process(self.namespace(), "").await;

        if conn.namespace(self.namespace()).is_none() {
            return Ok(());
        }

        let intent = Message::lifecycle(self.namespace(), "", ON_NAMESPACE_DISCONNECT);
        if let Err(e) = conn.ask_raw(ctx, intent).await {
            conn.count_handshake("disconnect", outcome_of(&e));
            return Err(e);
        }

        self.force_leave_all(true).await;
        conn.remove_namespace(self.namespace());
        conn.unsubscribe(self.namespace()).await;
        conn.count_handshake("disconnect", "ok");

        let mut local = Message::lifecycle(self.namespace(), "", ON_NAMESPACE_DISCONNECT);
        local.is_local = true;
        self.inner.events.fire(self.clone(), local).await.map(|_| ())
    }

    pub fn has_room(&self, room: &str) -> bool {
        read(&self.inner.rooms).contains(room)
    }

    pub(crate) fn add_room(&self, room: &str) -> bool {
        write(&self.inner.rooms).insert(room.to_owned())
    }

    pub(crate) fn remove_room(&self, room: &str) -> bool {
        write(&self.inner.rooms).remove(room)
    }

    /// Drop every room without a handshake, firing forced leave events.
    pub(crate) async fn force_leave_all(&self, is_local: bool) {
        let rooms: Vec<String> = write(&self.inner.rooms).drain().collect();
        for room in rooms {
            for event in [ON_ROOM_LEAVE, ON_ROOM_LEFT] {
                let mut msg = Message::lifecycle(self.namespace(), &room, event);
                msg.is_forced = true;
                msg.is_local = is_local;
                if let Err(e) = self.inner.events.fire(self.clone(), msg).await {
                    debug!(namespace = %self.namespace(), room = %room, error = %e, "forced leave handler failed");
                }
            }
        }
    }

    /// Teardown path used by `Conn::close`.
    pub(crate) async fn force_disconnect(&self) {
        self.force_leave_all(true).await;
        let mut msg = Message::lifecycle(self.namespace(), "", ON_NAMESPACE_DISCONNECT);
        msg.is_forced = true;
        msg.is_local = true;
        if let Err(e) = self.inner.events.fire(self.clone(), msg).await {
            debug!(namespace = %self.namespace(), error = %e, "forced disconnect handler failed");
        }
    }
}
