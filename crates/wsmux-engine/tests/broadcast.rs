//! Server broadcast: exclusion, targeting, room scoping, slow peers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wsmux_core::error::Result;
use wsmux_core::{Frame, Message, Socket};
use wsmux_engine::config::ConnectionConfig;
use wsmux_engine::transport::memory::{pipe, MemorySocket};
use wsmux_engine::{reply, Client, ClientOptions, Conn, Events, Namespaces, Server};

use common::{ctx, dial, eventually, Log, WAIT};

fn chat_table(log: Log, name: &'static str) -> Namespaces {
    Namespaces::builder()
        .on("default", "chat", move |_ns, msg| {
            let log = log.clone();
            async move {
                log.push(format!("{name}:{}", String::from_utf8_lossy(&msg.body)));
                Ok(None)
            }
        })
        .build()
}

async fn three_clients(server: &Server, log: &Log) -> Vec<(Client, Conn)> {
    let mut out = Vec::new();
    for name in ["a", "b", "c"] {
        let (client, conn) = dial(server, chat_table(log.clone(), name)).await.unwrap();
        client.connect(&ctx(), "default").await.unwrap();
        out.push((client, conn));
    }
    out
}

fn server() -> Server {
    Server::new(Namespaces::builder().namespace("default", Events::new()).build())
}

#[tokio::test]
async fn broadcast_skips_sender() {
    let server = server();
    let log = Log::default();
    let peers = three_clients(&server, &log).await;
    assert!(eventually(|| server.get_total_connections() == 3).await);

    server
        .broadcast(Some(&peers[0].1), Message::new("default", "chat", "hi"))
        .await;

    assert!(eventually(|| log.entries().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(log.count("a:hi"), 0);
    assert_eq!(log.count("b:hi"), 1);
    assert_eq!(log.count("c:hi"), 1);
}

#[tokio::test]
async fn broadcast_to_single_connection() {
    let server = server();
    let log = Log::default();
    let peers = three_clients(&server, &log).await;
    assert!(eventually(|| server.get_total_connections() == 3).await);

    let mut msg = Message::new("default", "chat", "psst");
    msg.to = peers[1].1.id().to_owned();
    server.broadcast(None, msg).await;

    assert!(eventually(|| log.count("b:psst") == 1).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(log.entries(), vec!["b:psst"]);
}

#[tokio::test]
async fn room_broadcast_reaches_members_only() {
    let server = server();
    let log = Log::default();
    let peers = three_clients(&server, &log).await;
    assert!(eventually(|| server.get_total_connections() == 3).await);

    for (client, _) in &peers[..2] {
        let ns = client.conn().namespace("default").unwrap();
        ns.join_room(&ctx(), "room1").await.unwrap();
    }

    server
        .broadcast(None, Message::new("default", "chat", "members").in_room("room1"))
        .await;

    assert!(eventually(|| log.entries().len() == 2).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(log.count("c:members"), 0);
}

#[tokio::test]
async fn do_all_and_lookup_see_live_set() {
    let server = server();
    let log = Log::default();
    let peers = three_clients(&server, &log).await;
    assert!(eventually(|| server.get_total_connections() == 3).await);

    let seen = Log::default();
    let sink = seen.clone();
    server.do_all(move |conn| sink.push(conn.id().to_owned())).await;
    assert_eq!(seen.entries().len(), 3);

    let id = peers[2].1.id().to_owned();
    let found = server.get_connection(&id).await.unwrap();
    assert_eq!(found.id(), id);
    assert!(server.get_connection("missing").await.is_none());
    assert_eq!(server.connections().await.len(), 3);

    peers[2].0.close().await;
    assert!(eventually(|| server.get_total_connections() == 2).await);
    assert!(server.get_connection(&id).await.is_none());
}

/// Relays every `chat` it receives, the way a chat gateway does.
fn relay_server() -> Server {
    Server::new(
        Namespaces::builder()
            .on("default", "chat", |ns, msg| async move {
                if let Some(server) = ns.conn().server() {
                    server.broadcast(Some(ns.conn()), msg).await;
                }
                Ok(None)
            })
            .on("default", "slow", |_ns, _msg| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                reply("slow reply")
            })
            .build(),
    )
}

#[tokio::test]
async fn relayed_ask_reaches_peers_without_answering_their_asks() {
    let server = relay_server();
    let log = Log::default();
    let (a, _) = dial(&server, chat_table(log.clone(), "a")).await.unwrap();
    let (b, _) = dial(&server, chat_table(log.clone(), "b")).await.unwrap();
    let a_ns = a.connect(&ctx(), "default").await.unwrap();
    let b_ns = b.connect(&ctx(), "default").await.unwrap();
    assert!(eventually(|| server.get_total_connections() == 2).await);

    // Both clients are on their second wait token, so the tokens collide.
    let pending = tokio::spawn(async move { b_ns.ask(&ctx(), "slow", "").await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    a_ns.ask(&ctx(), "chat", "from-a").await.unwrap();

    assert!(eventually(|| log.count("b:from-a") == 1).await);
    let resp = pending.await.unwrap().unwrap();
    assert_eq!(resp.event, "slow");
    assert_eq!(resp.body.as_ref(), b"slow reply");
    assert_eq!(log.count("a:from-a"), 0);
}

/// Server-side socket whose writes hang once `stalled` is set.
struct StallingSocket {
    inner: MemorySocket,
    stalled: Arc<AtomicBool>,
}

#[async_trait]
impl Socket for StallingSocket {
    async fn read_frame(&self, timeout: Duration) -> Result<Frame> {
        self.inner.read_frame(timeout).await
    }

    async fn write_frame(&self, frame: Frame, timeout: Duration) -> Result<()> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.write_frame(frame, timeout).await
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

#[tokio::test]
async fn stalled_peer_drops_broadcasts_without_blocking_others() {
    let table = Namespaces::builder().namespace("default", Events::new()).build();
    let server = Server::builder(table)
        .config(ConnectionConfig {
            write_queue: 1,
            broadcast_timeout_ms: 50,
            ..ConnectionConfig::default()
        })
        .build();
    let log = Log::default();

    let (server_end, client_end) = pipe();
    let stalled = Arc::new(AtomicBool::new(false));
    let socket: Arc<dyn Socket> = Arc::new(StallingSocket {
        inner: server_end,
        stalled: stalled.clone(),
    });
    let accept = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_socket(socket).await })
    };
    let slow = Client::from_socket(
        &ctx(),
        Arc::new(client_end),
        chat_table(log.clone(), "slow"),
        ClientOptions::default(),
    )
    .await
    .unwrap();
    let slow_conn = accept.await.unwrap().unwrap();
    slow.connect(&ctx(), "default").await.unwrap();

    let (healthy, _) = dial(&server, chat_table(log.clone(), "healthy")).await.unwrap();
    healthy.connect(&ctx(), "default").await.unwrap();
    assert!(eventually(|| server.get_total_connections() == 2).await);

    stalled.store(true, Ordering::SeqCst);
    for i in 0..4 {
        let msg = Message::new("default", "chat", format!("m{i}"));
        tokio::time::timeout(Duration::from_millis(20), server.broadcast(None, msg))
            .await
            .unwrap();
    }

    // Commands run in order, so the lookup returns after every delivery.
    let found = tokio::time::timeout(WAIT, server.get_connection(slow_conn.id()))
        .await
        .unwrap();
    assert!(found.is_some());

    assert!(eventually(|| log.entries().len() == 4).await);
    for i in 0..4 {
        assert_eq!(log.count(&format!("healthy:m{i}")), 1);
    }
    // One frame is stuck in the socket, one fills the queue, the rest drop.
    assert_eq!(server.metrics().broadcast_dropped.get(&[]), 2);
    assert_eq!(log.count("slow:m0"), 0);
}
