//! Client-side WebSocket adapter (tokio-tungstenite).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::{Frame, Socket};

use super::with_timeout;
use crate::client::Dialer;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TungsteniteSocket {
    sink: Mutex<SplitSink<ClientStream, WsMessage>>,
    stream: Mutex<SplitStream<ClientStream>>,
    peer: Option<SocketAddr>,
}

impl TungsteniteSocket {
    fn new(ws: ClientStream) -> Self {
        let peer = match ws.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
            _ => None,
        };
        let (sink, stream) = ws.split();
        Self {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            peer,
        }
    }
}

fn map_ws_error(e: WsError) -> WsMuxError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => WsMuxError::UnexpectedEof,
        other => WsMuxError::Transport(other.to_string()),
    }
}

#[async_trait]
impl Socket for TungsteniteSocket {
    async fn read_frame(&self, timeout: Duration) -> Result<Frame> {
        with_timeout(timeout, async {
            let mut stream = self.stream.lock().await;
            loop {
                let msg = match stream.next().await {
                    None => return Err(WsMuxError::UnexpectedEof),
                    Some(Err(e)) => return Err(map_ws_error(e)),
                    Some(Ok(msg)) => msg,
                };
                match msg {
                    WsMessage::Text(text) => return Ok(Frame::Text(Bytes::from(text))),
                    WsMessage::Binary(data) => return Ok(Frame::Binary(Bytes::from(data))),
                    WsMessage::Close(_) => return Err(WsMuxError::UnexpectedEof),
                    _ => continue,
                }
            }
        })
        .await
    }

    async fn write_frame(&self, frame: Frame, timeout: Duration) -> Result<()> {
        let msg = match frame {
            Frame::Text(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => WsMessage::Text(text),
                Err(e) => WsMessage::Binary(e.into_bytes()),
            },
            Frame::Binary(data) => WsMessage::Binary(data.to_vec()),
        };
        with_timeout(timeout, async {
            self.sink.lock().await.send(msg).await.map_err(map_ws_error)
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

/// Dials `ws://` and `wss://` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteDialer;

#[async_trait]
impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &str) -> Result<Arc<dyn Socket>> {
        let (ws, _response) = connect_async(url).await.map_err(map_ws_error)?;
        Ok(Arc::new(TungsteniteSocket::new(ws)))
    }
}
