//! wsmux gateway
//!
//! Serves the `default` namespace over the configured WebSocket route:
//! - `chat` is relayed to every other connection with `default` connected
//! - rooms are open; `chat` sent inside a room stays in that room

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use wsmux_core::protocol::events::ON_NAMESPACE_CONNECTED;
use wsmux_core::Message;
use wsmux_engine::{config, router, Events, Namespaces, Server};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var("WSMUX_CONFIG").unwrap_or_else(|_| "wsmux.yaml".into());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .server
        .listen
        .parse()
        .expect("server.listen must be a valid SocketAddr");

    let events = Events::new()
        .on(ON_NAMESPACE_CONNECTED, |ns, _msg| async move {
            tracing::info!(conn = %ns.conn().id(), namespace = %ns.namespace(), "namespace connected");
            Ok(None)
        })
        .on("chat", |ns, msg| async move {
            if let Some(server) = ns.conn().server() {
                let out = Message::new(ns.namespace(), "chat", msg.body.clone())
                    .in_room(msg.room.clone());
                server.broadcast(Some(ns.conn()), out).await;
            }
            Ok(None)
        });
    let namespaces = Namespaces::builder().namespace("default", events).build();

    let server = Server::builder(namespaces)
        .config(cfg.connection.clone())
        .on_error(|conn, err| {
            tracing::warn!(conn = %conn.id(), error = %err, code = err.code().as_str(), "dispatch error");
        })
        .build();
    let app = router::build_router(server, &cfg.server.path);

    tracing::info!(%listen, path = %cfg.server.path, "wsmux-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .expect("server failed");
}
