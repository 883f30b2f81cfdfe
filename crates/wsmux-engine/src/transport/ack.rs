//! Connection-ID acknowledgement.
//!
//! ```text
//! client -> server   M
//! server -> client   A<connection id>     accepted
//! server -> client   H<error text>        rejected by on_connect
//! ```

use std::time::Duration;

use bytes::Bytes;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::{Frame, Socket};

pub const ACK_REQUEST: u8 = b'M';
pub const ACK_ID: u8 = b'A';
pub const ACK_NOT_OK: u8 = b'H';

/// Client side: announce ourselves and wait for the assigned ID.
pub async fn request(socket: &dyn Socket, timeout: Duration) -> Result<String> {
    socket
        .write_frame(Frame::Text(Bytes::from_static(&[ACK_REQUEST])), timeout)
        .await?;
    let frame = socket.read_frame(timeout).await?;
    let data = frame.as_bytes();
    match data.first() {
        Some(&ACK_ID) => String::from_utf8(data[1..].to_vec()).map_err(|_| WsMuxError::InvalidPayload),
        Some(&ACK_NOT_OK) => Err(WsMuxError::from_text(&String::from_utf8_lossy(&data[1..]))),
        _ => Err(WsMuxError::InvalidPayload),
    }
}

/// Server side: wait for the client's announcement.
pub async fn expect_request(socket: &dyn Socket, timeout: Duration) -> Result<()> {
    let frame = socket.read_frame(timeout).await?;
    if frame.as_bytes().as_ref() == [ACK_REQUEST] {
        Ok(())
    } else {
        Err(WsMuxError::InvalidPayload)
    }
}

pub async fn accept(socket: &dyn Socket, id: &str, timeout: Duration) -> Result<()> {
    let mut data = Vec::with_capacity(id.len() + 1);
    data.push(ACK_ID);
    data.extend_from_slice(id.as_bytes());
    socket.write_frame(Frame::Text(Bytes::from(data)), timeout).await
}

pub async fn reject(socket: &dyn Socket, err: &WsMuxError, timeout: Duration) -> Result<()> {
    let text = err.to_string();
    let mut data = Vec::with_capacity(text.len() + 1);
    data.push(ACK_NOT_OK);
    data.extend_from_slice(text.as_bytes());
    socket.write_frame(Frame::Text(Bytes::from(data)), timeout).await
}
