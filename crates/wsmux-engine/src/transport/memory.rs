//! In-process socket pair.
//!
//! Closing either end ends the link: the peer reads `UnexpectedEof` once
//! the frames already sent are drained, and further writes fail.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::{Frame, Socket};

use super::with_timeout;

pub struct MemorySocket {
    tx: mpsc::UnboundedSender<Frame>,
    rx: Mutex<mpsc::UnboundedReceiver<Frame>>,
    link: CancellationToken,
}

/// Two connected ends.
pub fn pipe() -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let link = CancellationToken::new();
    (
        MemorySocket {
            tx: a_tx,
            rx: Mutex::new(a_rx),
            link: link.clone(),
        },
        MemorySocket {
            tx: b_tx,
            rx: Mutex::new(b_rx),
            link,
        },
    )
}

#[async_trait]
impl Socket for MemorySocket {
    async fn read_frame(&self, timeout: Duration) -> Result<Frame> {
        with_timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            tokio::select! {
                biased;
                frame = rx.recv() => frame.ok_or(WsMuxError::UnexpectedEof),
                _ = self.link.cancelled() => Err(WsMuxError::UnexpectedEof),
            }
        })
        .await
    }

    async fn write_frame(&self, frame: Frame, _timeout: Duration) -> Result<()> {
        if self.link.is_cancelled() {
            return Err(WsMuxError::Closed);
        }
        self.tx.send(frame).map_err(|_| WsMuxError::Closed)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) {
        self.link.cancel();
    }
}
