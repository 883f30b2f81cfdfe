//! Server: accepts sockets and owns the live connection set.
//!
//! The live set is mutated only by one coordination task fed by a command
//! channel. Broadcasts are delivered from that task with a per-target
//! timeout so a slow peer drops the message instead of stalling everyone.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info};
use uuid::Uuid;

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::{Message, Socket};

use crate::config::ConnectionConfig;
use crate::conn::{Conn, ConnOptions};
use crate::dispatch::hooks::{connect_hook, disconnect_hook};
use crate::dispatch::{ConnectHook, DisconnectHook, ErrorHook, Namespaces};
use crate::exchange::StackExchange;
use crate::obs::EngineMetrics;
use crate::transport::ack;

pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

type Visitor = Box<dyn FnOnce(&HashMap<String, Conn>) + Send>;

enum Command {
    Register(Conn),
    Unregister(String),
    Broadcast { except: Option<String>, msg: Message },
    Do(Visitor),
}

pub(crate) struct ServerInner {
    namespaces: Namespaces,
    config: ConnectionConfig,
    on_connect: Option<ConnectHook>,
    on_error: Option<ErrorHook>,
    exchange: Option<Arc<dyn StackExchange>>,
    id_generator: IdGenerator,
    cmd_tx: mpsc::UnboundedSender<Command>,
    total: Arc<AtomicU64>,
    metrics: Arc<EngineMetrics>,
    closed: AtomicBool,
}

/// Cheap to clone; every clone drives the same live set.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

pub struct ServerBuilder {
    namespaces: Namespaces,
    config: ConnectionConfig,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
    on_error: Option<ErrorHook>,
    exchange: Option<Arc<dyn StackExchange>>,
    id_generator: Option<IdGenerator>,
}

impl ServerBuilder {
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs before the connection is registered or acknowledged; an error
    /// rejects it and is sent to the client. The read loop is not running
    /// yet, so handshakes started here must be spawned.
    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Conn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_connect = Some(connect_hook(f));
        self
    }

    pub fn on_disconnect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Conn) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect = Some(disconnect_hook(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Conn, &WsMuxError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn stack_exchange(mut self, exchange: Arc<dyn StackExchange>) -> Self {
        self.exchange = Some(exchange);
        self
    }

    pub fn id_generator<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.id_generator = Some(Arc::new(f));
        self
    }

    /// Spawns the coordination task; must run inside a tokio runtime.
    pub fn build(self) -> Server {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let total = Arc::new(AtomicU64::new(0));
        let metrics = Arc::new(EngineMetrics::default());

        let registry = Registry {
            conns: HashMap::new(),
            total: total.clone(),
            metrics: metrics.clone(),
            exchange: self.exchange.clone(),
            on_disconnect: self.on_disconnect,
            broadcast_timeout: self.config.broadcast_timeout(),
        };
        tokio::spawn(registry.run(cmd_rx));

        Server {
            inner: Arc::new(ServerInner {
                namespaces: self.namespaces,
                config: self.config,
                on_connect: self.on_connect,
                on_error: self.on_error,
                exchange: self.exchange,
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Arc::new(|| Uuid::new_v4().to_string())),
                cmd_tx,
                total,
                metrics,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Server {
    pub fn new(namespaces: Namespaces) -> Self {
        Self::builder(namespaces).build()
    }

    pub fn builder(namespaces: Namespaces) -> ServerBuilder {
        ServerBuilder {
            namespaces,
            config: ConnectionConfig::default(),
            on_connect: None,
            on_disconnect: None,
            on_error: None,
            exchange: None,
            id_generator: None,
        }
    }

    pub(crate) fn from_inner(inner: Arc<ServerInner>) -> Self {
        Self { inner }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.inner.namespaces
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    /// Accept path for an upgraded socket: acknowledgement, ID, hooks,
    /// registration, then the connection tasks.
    pub async fn serve_socket(&self, socket: Arc<dyn Socket>) -> Result<Conn> {
        let inner = &self.inner;
        inner.metrics.upgrades.inc(&[]);
        if inner.closed.load(Ordering::SeqCst) {
            socket.close().await;
            return Err(WsMuxError::Closed);
        }

        let with_ack = !inner.namespaces.only_native();
        let read_timeout = inner.config.read_timeout();
        let write_timeout = inner.config.write_timeout();

        if with_ack {
            if let Err(e) = ack::expect_request(socket.as_ref(), read_timeout).await {
                inner.metrics.handshakes.inc(&[("kind", "ack"), ("outcome", "invalid")]);
                socket.close().await;
                return Err(e);
            }
        }

        let id = (inner.id_generator)();
        let cmd_tx = inner.cmd_tx.clone();
        let conn = Conn::new(
            socket.clone(),
            ConnOptions {
                id,
                is_client: false,
                namespaces: inner.namespaces.clone(),
                config: inner.config.clone(),
                on_error: inner.on_error.clone(),
                exchange: inner.exchange.clone(),
                metrics: inner.metrics.clone(),
                server: Some(Arc::downgrade(&self.inner)),
                on_close: Some(Box::new(move |conn: &Conn| {
                    let _ = cmd_tx.send(Command::Unregister(conn.id().to_owned()));
                })),
            },
        );

        if let Err(e) = self.admit(&conn).await {
            inner.metrics.handshakes.inc(&[("kind", "ack"), ("outcome", "rejected")]);
            debug!(conn = %conn.id(), error = %e, "connection rejected");
            if with_ack {
                let _ = ack::reject(socket.as_ref(), &e, write_timeout).await;
            }
            conn.close().await;
            return Err(e);
        }

        if with_ack {
            if let Err(e) = ack::accept(socket.as_ref(), conn.id(), write_timeout).await {
                conn.close().await;
                return Err(e);
            }
        }
        inner.metrics.handshakes.inc(&[("kind", "ack"), ("outcome", "ok")]);

        let _ = inner.cmd_tx.send(Command::Register(conn.clone()));
        conn.start();
        debug!(conn = %conn.id(), peer = ?conn.peer_addr(), "connection accepted");
        Ok(conn)
    }

    async fn admit(&self, conn: &Conn) -> Result<()> {
        if let Some(hook) = &self.inner.on_connect {
            hook(conn.clone()).await?;
        }
        if let Some(exchange) = &self.inner.exchange {
            exchange.on_connect(conn).await?;
        }
        Ok(())
    }

    /// Send `msg` to every live connection except `from`, limited to
    /// `msg.to` when set. Returns once the delivery is scheduled.
    pub async fn broadcast(&self, from: Option<&Conn>, mut msg: Message) {
        if let Some(from) = from {
            msg.from = from.id().to_owned();
        }
        // Wait tokens are per connection; a relayed token would collide
        // with the receivers' own asks.
        msg.wait.clear();
        msg.is_noop = false;
        if let Some(exchange) = &self.inner.exchange {
            if exchange.publish(&msg).await {
                return;
            }
        }
        let except = from.map(|c| c.id().to_owned());
        let _ = self.inner.cmd_tx.send(Command::Broadcast { except, msg });
    }

    /// Run `f` for every live connection inside the coordination task.
    pub async fn do_all<F>(&self, mut f: F)
    where
        F: FnMut(&Conn) + Send + 'static,
    {
        self.visit(move |conns| conns.values().for_each(&mut f))
            .await;
    }

    async fn visit<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&HashMap<String, Conn>) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let visitor: Visitor = Box::new(move |conns| {
            let _ = tx.send(f(conns));
        });
        self.inner.cmd_tx.send(Command::Do(visitor)).ok()?;
        rx.await.ok()
    }

    pub async fn connections(&self) -> Vec<Conn> {
        self.visit(|conns| {
            let mut list: Vec<Conn> = conns.values().cloned().collect();
            list.sort_by(|a, b| a.id().cmp(b.id()));
            list
        })
        .await
        .unwrap_or_default()
    }

    pub async fn get_connection(&self, id: &str) -> Option<Conn> {
        let id = id.to_owned();
        self.visit(move |conns| conns.get(&id).cloned()).await.flatten()
    }

    pub fn get_total_connections(&self) -> u64 {
        self.inner.total.load(Ordering::SeqCst)
    }

    /// Stop accepting and close every live connection.
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let conns = self.connections().await;
        info!(count = conns.len(), "closing server connections");
        for conn in conns {
            conn.close().await;
        }
    }
}

struct Registry {
    conns: HashMap<String, Conn>,
    total: Arc<AtomicU64>,
    metrics: Arc<EngineMetrics>,
    exchange: Option<Arc<dyn StackExchange>>,
    on_disconnect: Option<DisconnectHook>,
    broadcast_timeout: Duration,
}

impl Registry {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Register(conn) => self.register(conn),
                Command::Unregister(id) => self.unregister(&id),
                Command::Broadcast { except, msg } => self.deliver(except, msg).await,
                Command::Do(visitor) => visitor(&self.conns),
            }
        }
    }

    fn register(&mut self, conn: Conn) {
        // Closed before registration (e.g. from inside on_connect).
        if conn.is_closed() {
            return;
        }
        self.conns.insert(conn.id().to_owned(), conn);
        self.total.fetch_add(1, Ordering::SeqCst);
        self.metrics.connections_active.inc();
    }

    fn unregister(&mut self, id: &str) {
        let Some(conn) = self.conns.remove(id) else {
            return;
        };
        self.total.fetch_sub(1, Ordering::SeqCst);
        self.metrics.connections_active.dec();

        let exchange = self.exchange.clone();
        let on_disconnect = self.on_disconnect.clone();
        if exchange.is_some() || on_disconnect.is_some() {
            tokio::spawn(async move {
                if let Some(exchange) = exchange {
                    exchange.on_disconnect(&conn).await;
                }
                if let Some(hook) = on_disconnect {
                    hook(conn).await;
                }
            });
        }
    }

    async fn deliver(&self, except: Option<String>, msg: Message) {
        let mut deliveries = FuturesUnordered::new();
        for conn in self.conns.values() {
            if except.as_deref() == Some(conn.id()) {
                continue;
            }
            if !msg.to.is_empty() && msg.to != conn.id() {
                continue;
            }
            if !conn.can_write(&msg) {
                continue;
            }
            let msg = &msg;
            let limit = self.broadcast_timeout;
            deliveries.push(async move {
                matches!(timeout(limit, conn.send(msg)).await, Ok(true))
            });
        }

        while let Some(delivered) = deliveries.next().await {
            if !delivered {
                self.metrics.broadcast_dropped.inc(&[]);
            }
        }
    }
}
