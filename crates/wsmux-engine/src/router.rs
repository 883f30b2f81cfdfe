//! Axum router wiring (HTTP -> WS upgrade, ops endpoints).

use axum::{routing::get, Router};

use crate::{ops, server::Server, transport};

pub fn build_router(server: Server, path: &str) -> Router {
    Router::new()
        .route(path, get(transport::ws::ws_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(server)
}
