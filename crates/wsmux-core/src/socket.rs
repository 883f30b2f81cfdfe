//! Socket capability consumed by the connection layer.
//!
//! Transport adapters (axum upgrade, tokio-tungstenite dial, in-memory pipe)
//! implement this trait. The connection calls `read_frame` from exactly one
//! task and `write_frame` from exactly one task, but implementations must
//! still tolerate concurrent callers.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One logical transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(Bytes),
    Binary(Bytes),
}

impl Frame {
    pub fn as_bytes(&self) -> &Bytes {
        match self {
            Frame::Text(b) | Frame::Binary(b) => b,
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Frame::Text(b) | Frame::Binary(b) => b,
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }
}

/// Minimal socket interface.
///
/// A zero timeout means "block until the transport gives up".
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    /// Read exactly one frame. Returns `WsMuxError::UnexpectedEof` when the
    /// remote side closed the connection.
    async fn read_frame(&self, timeout: Duration) -> Result<Frame>;

    /// Write exactly one frame.
    async fn write_frame(&self, frame: Frame, timeout: Duration) -> Result<()>;

    /// Remote address, when the transport exposes one.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Close the underlying transport. Idempotent.
    async fn close(&self);
}
