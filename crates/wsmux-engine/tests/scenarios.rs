//! End-to-end scenarios over in-memory pipes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use wsmux_core::protocol::events::{
    ON_NAMESPACE_CONNECTED, ON_NATIVE_MESSAGE, ON_ROOM_LEFT,
};
use wsmux_core::{Message, WsMuxError};
use wsmux_engine::{reply, Events, Namespaces, Server};

use common::{ctx, dial, eventually, Counter, Log};

fn client_table() -> Namespaces {
    Namespaces::builder().namespace("default", Events::new()).build()
}

#[tokio::test]
async fn connect_fires_server_connected_once() {
    let connected = Counter::default();
    let server = {
        let connected = connected.clone();
        Server::new(
            Namespaces::builder()
                .on("default", ON_NAMESPACE_CONNECTED, move |_ns, msg| {
                    let connected = connected.clone();
                    async move {
                        assert!(!msg.is_local);
                        connected.inc();
                        Ok(None)
                    }
                })
                .build(),
        )
    };

    let (client, server_conn) = dial(&server, client_table()).await.unwrap();
    let ns = client.connect(&ctx(), "default").await.unwrap();
    assert_eq!(ns.namespace(), "default");

    assert!(eventually(|| connected.get() == 1).await);
    assert!(server_conn.namespace("default").is_some());
    assert_eq!(client.id(), server_conn.id());

    // Connecting again reuses the committed namespace.
    client.connect(&ctx(), "default").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(connected.get(), 1);
}

#[tokio::test]
async fn ask_returns_handler_reply() {
    let server = Server::new(
        Namespaces::builder()
            .on("default", "ping", |_ns, _msg| async { reply("PONG MESSAGE") })
            .build(),
    );

    let (client, _) = dial(&server, client_table()).await.unwrap();
    let ns = client.connect(&ctx(), "default").await.unwrap();

    let resp = ns.ask(&ctx(), "ping", "PING MESSAGE").await.unwrap();
    assert_eq!(resp.body.as_ref(), b"PONG MESSAGE");
    assert_eq!(resp.event, "ping");
    assert_eq!(resp.namespace, "default");
}

#[tokio::test]
async fn room_echo_then_leave_from_handler() {
    let server = Server::new(
        Namespaces::builder()
            .on("default", "event", |ns, msg| async move {
                let server = ns.conn().server().expect("server-side connection");
                let out = Message::new("default", "event", msg.body.clone()).in_room(msg.room.clone());
                server.broadcast(None, out).await;
                Ok(None)
            })
            .build(),
    );

    let log = Log::default();
    let events = {
        let on_event = log.clone();
        let on_left = log.clone();
        Events::new()
            .on("event", move |ns, msg| {
                let log = on_event.clone();
                async move {
                    log.push(format!("event:{}:{}", msg.room, String::from_utf8_lossy(&msg.body)));
                    if let Some(room) = ns.room(&msg.room) {
                        room.leave(&ctx()).await?;
                    }
                    Ok(None)
                }
            })
            .on(ON_ROOM_LEFT, move |_ns, msg| {
                let log = on_left.clone();
                async move {
                    log.push(format!("left:{}", msg.room));
                    Ok(None)
                }
            })
    };
    let table = Namespaces::builder().namespace("default", events).build();

    let (client, server_conn) = dial(&server, table).await.unwrap();
    let ns = client.connect(&ctx(), "default").await.unwrap();
    let room = ns.join_room(&ctx(), "room1").await.unwrap();
    assert!(room.emit("event", "data").await);

    assert!(eventually(|| log.entries().len() == 2).await);
    assert_eq!(log.entries(), vec!["event:room1:data", "left:room1"]);
    assert!(!ns.has_room("room1"));
    let server_ns = server_conn.namespace("default").unwrap();
    assert!(eventually(|| !server_ns.has_room("room1")).await);
}

#[tokio::test]
async fn unknown_remote_namespace_is_bad_namespace() {
    let server = Server::new(client_table());
    let table = Namespaces::builder()
        .namespace("default", Events::new())
        .namespace("unknown", Events::new())
        .build();

    let (client, server_conn) = dial(&server, table).await.unwrap();
    let err = client.connect(&ctx(), "unknown").await.unwrap_err();
    assert_eq!(err, WsMuxError::BadNamespace);
    assert!(client.conn().namespace("unknown").is_none());
    assert!(server_conn.namespace("unknown").is_none());

    // Unknown locally: refused before anything is sent.
    let err = client.connect(&ctx(), "nowhere").await.unwrap_err();
    assert_eq!(err, WsMuxError::BadNamespace);

    // The connection survives protocol errors.
    client.connect(&ctx(), "default").await.unwrap();
}

#[tokio::test]
async fn native_messages_reach_native_handler() {
    let log = Log::default();
    let server = {
        let log = log.clone();
        Server::new(
            Namespaces::builder()
                .on("", ON_NATIVE_MESSAGE, move |_ns, msg| {
                    let log = log.clone();
                    async move {
                        assert!(msg.is_native);
                        assert_eq!(msg.event, ON_NATIVE_MESSAGE);
                        log.push(String::from_utf8_lossy(&msg.body).into_owned());
                        Ok(None)
                    }
                })
                .build(),
        )
    };

    let table = Namespaces::builder()
        .on("", ON_NATIVE_MESSAGE, |_ns, _msg| async { Ok(None) })
        .build();
    let (client, _) = dial(&server, table).await.unwrap();

    assert!(client.conn().write(Message::native("raw;payload")).await);
    assert!(eventually(|| log.count("raw;payload") == 1).await);
}
