//! Client side: dial, acknowledge, wrap in a `Conn`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::Socket;

use crate::config::ConnectionConfig;
use crate::conn::{Conn, ConnOptions, NSConn};
use crate::ctx::Ctx;
use crate::dispatch::{ErrorHook, Namespaces};
use crate::obs::EngineMetrics;
use crate::transport::ack;

/// Opens the transport for a URL.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, url: &str) -> Result<Arc<dyn Socket>>;
}

#[derive(Clone, Default)]
pub struct ClientOptions {
    pub config: ConnectionConfig,
    pub on_error: Option<ErrorHook>,
}

impl ClientOptions {
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Conn, &WsMuxError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// A dialed connection. Dropping the handle does not close it; call
/// [`Client::close`].
#[derive(Clone, Debug)]
pub struct Client {
    conn: Conn,
}

impl Client {
    pub async fn dial(
        ctx: &Ctx,
        dialer: &dyn Dialer,
        url: &str,
        namespaces: Namespaces,
    ) -> Result<Self> {
        Self::dial_with(ctx, dialer, url, namespaces, ClientOptions::default()).await
    }

    pub async fn dial_with(
        ctx: &Ctx,
        dialer: &dyn Dialer,
        url: &str,
        namespaces: Namespaces,
        opts: ClientOptions,
    ) -> Result<Self> {
        let socket = tokio::select! {
            res = dialer.dial(url) => res?,
            err = ctx.done() => return Err(err),
        };
        Self::from_socket(ctx, socket, namespaces, opts).await
    }

    /// Wrap an already open socket (e.g. one end of a memory pipe).
    pub async fn from_socket(
        ctx: &Ctx,
        socket: Arc<dyn Socket>,
        namespaces: Namespaces,
        opts: ClientOptions,
    ) -> Result<Self> {
        let id = if namespaces.only_native() {
            Uuid::new_v4().to_string()
        } else {
            let timeout = opts.config.read_timeout();
            let res = tokio::select! {
                res = ack::request(socket.as_ref(), timeout) => res,
                err = ctx.done() => Err(err),
            };
            match res {
                Ok(id) => id,
                Err(e) => {
                    debug!(error = %e, "connection acknowledgement failed");
                    socket.close().await;
                    return Err(e);
                }
            }
        };

        let conn = Conn::new(
            socket,
            ConnOptions {
                id,
                is_client: true,
                namespaces,
                config: opts.config,
                on_error: opts.on_error,
                exchange: None,
                metrics: Arc::new(EngineMetrics::default()),
                server: None,
                on_close: None,
            },
        );
        conn.start();
        Ok(Self { conn })
    }

    /// ID assigned by the server.
    pub fn id(&self) -> &str {
        self.conn.id()
    }

    pub fn conn(&self) -> &Conn {
        &self.conn
    }

    pub async fn connect(&self, ctx: &Ctx, namespace: &str) -> Result<NSConn> {
        self.conn.connect(ctx, namespace).await
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Resolves once the connection is closed, from either side.
    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_closed()
    }
}
