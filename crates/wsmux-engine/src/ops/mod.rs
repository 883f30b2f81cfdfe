//! Operational HTTP endpoints.
//!
//! - `/healthz` : liveness
//! - `/metrics` : Prometheus text format

use std::fmt::Write;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::server::Server;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(server): State<Server>) -> Response {
    let mut body = server.metrics().render();
    let _ = writeln!(
        body,
        "# TYPE wsmux_connections_total gauge\nwsmux_connections_total {}",
        server.get_total_connections()
    );

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
