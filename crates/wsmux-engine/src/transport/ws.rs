//! Server-side WebSocket adapter (axum).
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS on the configured route
//! - Wrap the upgraded socket as a `Socket`
//! - Hand it to `Server::serve_socket`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::{Frame, Socket};

use super::with_timeout;
use crate::server::Server;

pub struct AxumSocket {
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
    stream: Mutex<SplitStream<WebSocket>>,
    peer: Option<SocketAddr>,
}

impl AxumSocket {
    pub fn new(socket: WebSocket, peer: Option<SocketAddr>) -> Self {
        let (sink, stream) = socket.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            peer,
        }
    }
}

#[async_trait]
impl Socket for AxumSocket {
    async fn read_frame(&self, timeout: Duration) -> Result<Frame> {
        with_timeout(timeout, async {
            let mut stream = self.stream.lock().await;
            loop {
                let msg = match stream.next().await {
                    None => return Err(WsMuxError::UnexpectedEof),
                    Some(Err(e)) => return Err(WsMuxError::Transport(e.to_string())),
                    Some(Ok(msg)) => msg,
                };
                match msg {
                    WsMessage::Text(text) => return Ok(Frame::Text(Bytes::from(text))),
                    WsMessage::Binary(data) => return Ok(Frame::Binary(Bytes::from(data))),
                    WsMessage::Close(_) => return Err(WsMuxError::UnexpectedEof),
                    WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                }
            }
        })
        .await
    }

    async fn write_frame(&self, frame: Frame, timeout: Duration) -> Result<()> {
        let msg = match frame {
            // Text frames must be UTF-8; anything else goes out as binary.
            Frame::Text(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => WsMessage::Text(text),
                Err(e) => WsMessage::Binary(e.into_bytes()),
            },
            Frame::Binary(data) => WsMessage::Binary(data.to_vec()),
        };
        with_timeout(timeout, async {
            self.sink
                .lock()
                .await
                .send(msg)
                .await
                .map_err(|e| WsMuxError::Transport(e.to_string()))
        })
        .await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }
}

pub async fn ws_upgrade(
    State(server): State<Server>,
    peer: Option<ConnectInfo<SocketAddr>>,
    ws: WebSocketUpgrade,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| async move {
        let socket: Arc<dyn Socket> = Arc::new(AxumSocket::new(socket, peer));
        if let Err(e) = server.serve_socket(socket).await {
            debug!(peer = ?peer, error = %e, code = e.code().as_str(), "connection rejected");
        }
    })
}
