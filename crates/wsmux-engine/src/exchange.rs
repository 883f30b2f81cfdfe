//! Cross-process fan-out bridge.
//!
//! A `StackExchange` mirrors server broadcasts to other processes. The
//! engine only calls this narrow interface; implementations live outside
//! the crate. Calls may block, so implementations should keep them short.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use wsmux_core::error::Result;
use wsmux_core::Message;

use crate::conn::Conn;

#[async_trait]
pub trait StackExchange: Send + Sync + 'static {
    /// Called before a server connection is registered. An error rejects
    /// the connection.
    async fn on_connect(&self, conn: &Conn) -> Result<()>;

    /// Called once a server connection has been removed from the live set.
    async fn on_disconnect(&self, conn: &Conn);

    /// Publish a broadcast. Returning `true` means the bridge delivers it
    /// to local connections too, so the server skips its own fan-out.
    async fn publish(&self, msg: &Message) -> bool;

    /// The connection committed `namespace`.
    async fn subscribe(&self, conn: &Conn, namespace: &str);

    /// The connection left `namespace`.
    async fn unsubscribe(&self, conn: &Conn, namespace: &str);
}

/// Several bridges behind one `StackExchange`.
#[derive(Clone, Default)]
pub struct StackExchanges {
    bridges: Vec<Arc<dyn StackExchange>>,
}

impl StackExchanges {
    pub fn new(bridges: Vec<Arc<dyn StackExchange>>) -> Self {
        Self { bridges }
    }

    pub fn push(&mut self, bridge: Arc<dyn StackExchange>) {
        self.bridges.push(bridge);
    }

    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

#[async_trait]
impl StackExchange for StackExchanges {
    /// Stops at the first failure and rolls back the bridges that already
    /// accepted the connection.
    async fn on_connect(&self, conn: &Conn) -> Result<()> {
        for (i, bridge) in self.bridges.iter().enumerate() {
            if let Err(e) = bridge.on_connect(conn).await {
                warn!(conn = %conn.id(), bridge = i, error = %e, "stack exchange rejected connection");
                for done in &self.bridges[..i] {
                    done.on_disconnect(conn).await;
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn on_disconnect(&self, conn: &Conn) {
        for bridge in &self.bridges {
            bridge.on_disconnect(conn).await;
        }
    }

    /// True only when every bridge took over delivery.
    async fn publish(&self, msg: &Message) -> bool {
        let mut all = !self.bridges.is_empty();
        for bridge in &self.bridges {
            all &= bridge.publish(msg).await;
        }
        all
    }

    async fn subscribe(&self, conn: &Conn, namespace: &str) {
        for bridge in &self.bridges {
            bridge.subscribe(conn, namespace).await;
        }
    }

    async fn unsubscribe(&self, conn: &Conn, namespace: &str) {
        for bridge in &self.bridges {
            bridge.unsubscribe(conn, namespace).await;
        }
    }
}
