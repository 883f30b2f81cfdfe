use bytes::Bytes;

use wsmux_core::error::Result;
use wsmux_core::protocol::events::{ON_ROOM_LEAVE, ON_ROOM_LEFT};
use wsmux_core::Message;

use super::connection::outcome_of;
use super::NSConn;
use crate::ctx::Ctx;

/// Handle to a joined room.
#[derive(Clone, Debug)]
pub struct Room {
    ns: NSConn,
    name: String,
}

impl Room {
    pub(crate) fn new(ns: NSConn, name: &str) -> Self {
        Self {
            ns,
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ns(&self) -> &NSConn {
        &self.ns
    }

    /// Fire-and-forget event scoped to this room.
    pub async fn emit(&self, event: &str, body: impl Into<Bytes>) -> bool {
        let msg = Message::new(self.ns.namespace(), event, body).in_room(&self.name);
        self.ns.conn().write(msg).await
    }

    pub async fn emit_binary(&self, event: &str, body: impl Into<Bytes>) -> bool {
        let mut msg = Message::new(self.ns.namespace(), event, body).in_room(&self.name);
        msg.set_binary = true;
        self.ns.conn().write(msg).await
    }

    /// Leave the room (handshake initiator). A no-op when already left.
    pub async fn leave(&self, ctx: &Ctx) -> Result<()> {
        let conn = self.ns.conn();
        let namespace = self.ns.namespace();
        let _guard = conn.lock_process(namespace, &self.name).await;

        if !self.ns.has_room(&self.name) {
            return Ok(());
        }

        let mut local = Message::lifecycle(namespace, &self.name, ON_ROOM_LEAVE);
        local.is_local = true;
        if let Err(e) = self.ns.events().fire(self.ns.clone(), local).await {
            conn.count_handshake("leave", "rejected");
            return Err(e);
        }

        let intent = Message::lifecycle(namespace, &self.name, ON_ROOM_LEAVE);
        if let Err(e) = conn.ask_raw(ctx, intent).await {
            conn.count_handshake("leave", outcome_of(&e));
            return Err(e);
        }

        self.ns.remove_room(&self.name);
        conn.count_handshake("leave", "ok");
        let mut left = Message::lifecycle(namespace, &self.name, ON_ROOM_LEFT);
        left.is_local = true;
        if let Err(e) = self.ns.events().fire(self.ns.clone(), left).await {
            conn.report_error(&e);
        }
        Ok(())
    }
}
