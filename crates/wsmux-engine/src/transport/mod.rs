//! Socket adapters.
//!
//! - `ws`: server side, axum WebSocket upgrade
//! - `dial`: client side, tokio-tungstenite
//! - `memory`: in-process pipe for tests and embedding
//! - `ack`: connection-ID acknowledgement exchanged right after connect

pub mod ack;
pub mod dial;
pub mod memory;
pub mod ws;

use std::future::Future;
use std::time::Duration;

use wsmux_core::error::{Result, WsMuxError};

/// Bound `fut` by `timeout`; a zero timeout waits indefinitely.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| WsMuxError::Timeout)?
}
