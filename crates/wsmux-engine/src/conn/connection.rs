use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use dashmap::DashMap;
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use wsmux_core::error::{Result, WsMuxError};
use wsmux_core::protocol::events::{ON_NAMESPACE_CONNECT, ON_NAMESPACE_CONNECTED};
use wsmux_core::protocol::wire::{deserialize, serialize};
use wsmux_core::{Frame, Message, Socket};

use super::handshake::handle_inbound;
use super::wait::Waits;
use super::{lock, read, write, NSConn};
use crate::config::ConnectionConfig;
use crate::ctx::Ctx;
use crate::dispatch::{ErrorHook, Namespaces};
use crate::exchange::StackExchange;
use crate::obs::EngineMetrics;
use crate::server::{Server, ServerInner};

pub(crate) type CloseHook = Box<dyn Fn(&Conn) + Send + Sync>;

pub(crate) struct ConnOptions {
    pub id: String,
    pub is_client: bool,
    pub namespaces: Namespaces,
    pub config: ConnectionConfig,
    pub on_error: Option<ErrorHook>,
    pub exchange: Option<Arc<dyn StackExchange>>,
    pub metrics: Arc<EngineMetrics>,
    pub server: Option<Weak<ServerInner>>,
    pub on_close: Option<CloseHook>,
}

/// Where an inbound namespace message goes.
pub(crate) enum Route {
    Ready(NSConn, Message),
    /// Namespace not connected on this side.
    Missing(Message),
    /// Held until the in-flight connect handshake commits.
    Queued,
}

struct ConnInner {
    id: String,
    is_client: bool,
    socket: Arc<dyn Socket>,
    namespaces: Namespaces,
    allow_native: bool,
    config: ConnectionConfig,

    // Lock order: `connecting` before `connected`.
    connected: RwLock<HashMap<String, NSConn>>,
    connecting: Mutex<HashMap<String, Vec<Message>>>,
    processes: DashMap<(String, String), Arc<tokio::sync::Mutex<()>>>,
    waits: Waits,

    out_tx: mpsc::Sender<Frame>,
    out_rx: Mutex<Option<mpsc::Receiver<Frame>>>,

    closed: AtomicBool,
    shutdown: CancellationToken,
    finished: CancellationToken,

    on_error: Option<ErrorHook>,
    exchange: Option<Arc<dyn StackExchange>>,
    metrics: Arc<EngineMetrics>,
    server: Option<Weak<ServerInner>>,
    on_close: Option<CloseHook>,
}

/// One multiplexed connection, server or client side. Cheap to clone.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.inner.id)
            .field("is_client", &self.inner.is_client)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Conn {
    pub(crate) fn new(socket: Arc<dyn Socket>, opts: ConnOptions) -> Self {
        let (out_tx, out_rx) = mpsc::channel(opts.config.write_queue.max(1));
        let allow_native = opts.namespaces.allows_native();
        let conn = Self {
            inner: Arc::new(ConnInner {
                id: opts.id,
                is_client: opts.is_client,
                socket,
                namespaces: opts.namespaces,
                allow_native,
                config: opts.config,
                connected: RwLock::new(HashMap::new()),
                connecting: Mutex::new(HashMap::new()),
                processes: DashMap::new(),
                waits: Waits::new(opts.is_client),
                out_tx,
                out_rx: Mutex::new(Some(out_rx)),
                closed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                finished: CancellationToken::new(),
                on_error: opts.on_error,
                exchange: opts.exchange,
                metrics: opts.metrics,
                server: opts.server,
                on_close: opts.on_close,
            }),
        };

        // The native namespace needs no handshake.
        if allow_native {
            if let Some(events) = conn.inner.namespaces.get("") {
                let ns = NSConn::new(conn.clone(), "", events);
                write(&conn.inner.connected).insert(String::new(), ns);
            }
        }
        conn
    }

    /// Spawn the reader, writer and dispatch tasks. Runs once.
    pub(crate) fn start(&self) {
        let Some(out_rx) = lock(&self.inner.out_rx).take() else {
            return;
        };
        // Unbounded: handlers block on asks whose replies the read loop
        // resolves, so a full inbound queue would deadlock the connection.
        // A flooding peer is limited only by the socket read rate.
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().write_loop(out_rx));
        tokio::spawn(self.clone().dispatch_loop(in_rx));
        tokio::spawn(self.clone().read_loop(in_tx));
    }

    async fn read_loop(self, in_tx: mpsc::UnboundedSender<Message>) {
        let timeout = self.inner.config.read_timeout();
        loop {
            let frame = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                res = self.inner.socket.read_frame(timeout) => match res {
                    Ok(frame) => frame,
                    Err(e) => {
                        if e.is_close_error() {
                            debug!(conn = %self.inner.id, error = %e, "peer went away");
                        } else {
                            warn!(conn = %self.inner.id, error = %e, code = e.code().as_str(), "read failed");
                        }
                        break;
                    }
                },
            };

            let is_binary = frame.is_binary();
            let mut msg = deserialize(frame.into_bytes(), self.inner.allow_native);
            if msg.is_invalid {
                self.inner.metrics.decode_errors.inc(&[]);
                debug!(conn = %self.inner.id, "dropping malformed frame");
                self.report_error(&WsMuxError::InvalidPayload);
                continue;
            }
            msg.set_binary = is_binary;
            msg.from.clone_from(&self.inner.id);

            if self.inner.waits.is_reply(&msg.wait) {
                match self.inner.waits.resolve(msg) {
                    None => continue,
                    // Nobody waits (late reply or foreign token): handle it
                    // as a plain event so it is never answered.
                    Some(unclaimed) => {
                        trace!(conn = %self.inner.id, wait = %unclaimed.wait, "reply without waiter dispatched as event");
                        msg = unclaimed;
                        msg.wait.clear();
                    }
                }
            }

            if in_tx.send(msg).is_err() {
                break;
            }
        }
        self.close().await;
    }

    async fn dispatch_loop(self, mut in_rx: mpsc::UnboundedReceiver<Message>) {
        loop {
            let msg = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                msg = in_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
            };
            handle_inbound(&self, msg).await;
        }
    }

    async fn write_loop(self, mut out_rx: mpsc::Receiver<Frame>) {
        let timeout = self.inner.config.write_timeout();
        loop {
            let frame = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                frame = out_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if let Err(e) = self.inner.socket.write_frame(frame, timeout).await {
                if e.is_close_error() {
                    debug!(conn = %self.inner.id, error = %e, "write on closed socket");
                } else {
                    warn!(conn = %self.inner.id, error = %e, code = e.code().as_str(), "write failed");
                }
                break;
            }
        }
        self.close().await;
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn is_client(&self) -> bool {
        self.inner.is_client
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.socket.peer_addr()
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.inner.namespaces
    }

    /// The connected namespace, if its handshake has committed.
    pub fn namespace(&self, name: &str) -> Option<NSConn> {
        read(&self.inner.connected).get(name).cloned()
    }

    pub fn connected_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.connected).keys().cloned().collect();
        names.sort();
        names
    }

    /// The owning server, for server-side connections.
    pub fn server(&self) -> Option<Server> {
        self.inner
            .server
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Server::from_inner)
    }

    pub(crate) fn metrics(&self) -> &EngineMetrics {
        &self.inner.metrics
    }

    /// Queue a message. False when the connection is closed or the
    /// addressed namespace/room is not connected here. Handshake intents and
    /// native messages skip the namespace check.
    pub async fn write(&self, msg: Message) -> bool {
        if !self.can_write(&msg) {
            return false;
        }
        self.send(&msg).await
    }

    pub(crate) fn can_write(&self, msg: &Message) -> bool {
        if self.is_closed() {
            return false;
        }
        if msg.is_native || msg.is_connect() || msg.is_disconnect() {
            return true;
        }
        let connected = read(&self.inner.connected);
        let Some(ns) = connected.get(&msg.namespace) else {
            return false;
        };
        if msg.room.is_empty() || msg.is_room_join() || msg.is_room_leave() {
            return true;
        }
        ns.has_room(&msg.room)
    }

    /// Serialize and queue without validation.
    pub(crate) async fn send(&self, msg: &Message) -> bool {
        if self.is_closed() {
            return false;
        }
        let data = serialize(msg);
        let frame = if msg.set_binary {
            Frame::Binary(data)
        } else {
            Frame::Text(data)
        };
        tokio::select! {
            res = self.inner.out_tx.send(frame) => res.is_ok(),
            _ = self.inner.shutdown.cancelled() => false,
        }
    }

    /// Request/response over the stream. Resolves on the correlated reply,
    /// `ctx` cancellation or deadline, or connection close. An error reply
    /// comes back as `Err`.
    pub async fn ask(&self, ctx: &Ctx, msg: Message) -> Result<Message> {
        if !self.can_write(&msg) {
            return Err(self.write_error());
        }
        self.ask_raw(ctx, msg).await
    }

    pub(crate) async fn ask_raw(&self, ctx: &Ctx, mut msg: Message) -> Result<Message> {
        if self.is_closed() {
            return Err(WsMuxError::Closed);
        }
        let (pending, rx) = self.inner.waits.register();
        msg.wait = pending.token().to_owned();

        tokio::select! {
            sent = self.send(&msg) => {
                if !sent {
                    return Err(self.write_error());
                }
            }
            err = ctx.done() => return Err(err),
        }

        let reply = tokio::select! {
            res = rx => res.map_err(|_| WsMuxError::Closed)?,
            err = ctx.done() => return Err(err),
            _ = self.inner.shutdown.cancelled() => return Err(WsMuxError::Closed),
        };
        drop(pending);

        match reply.err {
            Some(e) => Err(e),
            None => Ok(reply),
        }
    }

    fn write_error(&self) -> WsMuxError {
        if self.is_closed() {
            WsMuxError::Closed
        } else {
            WsMuxError::Write
        }
    }

    /// Connect a namespace (handshake initiator). Returns the existing
    /// `NSConn` when already connected.
    pub async fn connect(&self, ctx: &Ctx, namespace: &str) -> Result<NSConn> {
        if self.is_closed() {
            return Err(WsMuxError::Closed);
        }
        let _guard = self.lock_process(namespace, "").await;

        if let Some(ns) = self.namespace(namespace) {
            return Ok(ns);
        }
        let events = self
            .inner
            .namespaces
            .get(namespace)
            .ok_or(WsMuxError::BadNamespace)?;
        let ns = NSConn::new(self.clone(), namespace, events);

        let mut local = Message::lifecycle(namespace, "", ON_NAMESPACE_CONNECT);
        local.is_local = true;
        if let Err(e) = ns.events().fire(ns.clone(), local).await {
            self.count_handshake("connect", "rejected");
            return Err(e);
        }

        self.begin_connect(namespace);
        let intent = Message::lifecycle(namespace, "", ON_NAMESPACE_CONNECT);
        if let Err(e) = self.ask_raw(ctx, intent).await {
            self.abort_connect(namespace);
            self.count_handshake("connect", outcome_of(&e));
            debug!(conn = %self.inner.id, namespace, error = %e, "connect failed");
            return Err(e);
        }

        let (ns, queued, inserted) = self.commit_namespace(ns);
        if inserted {
            self.count_handshake("connect", "ok");
            self.subscribe(namespace).await;
            let mut connected = Message::lifecycle(namespace, "", ON_NAMESPACE_CONNECTED);
            connected.is_local = true;
            if let Err(e) = ns.events().fire(ns.clone(), connected).await {
                self.report_error(&e);
            }
        }
        for msg in queued {
            handle_inbound(self, msg).await;
        }
        Ok(ns)
    }

    /// Close the connection. Idempotent. Leaves every room and disconnects
    /// every namespace with forced local events, then closes the socket.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(conn = %self.inner.id, "closing connection");
        self.inner.shutdown.cancel();
        self.inner.waits.clear();

        let namespaces: Vec<NSConn> = {
            let mut connecting = lock(&self.inner.connecting);
            connecting.clear();
            let mut connected = write(&self.inner.connected);
            connected.drain().map(|(_, ns)| ns).collect()
        };
        for ns in namespaces {
            ns.force_disconnect().await;
            if !ns.namespace().is_empty() {
                self.unsubscribe(ns.namespace()).await;
            }
        }

        self.inner.socket.close().await;
        if let Some(on_close) = &self.inner.on_close {
            on_close(self);
        }
        self.inner.finished.cancel();
    }

    /// Resolves once `close()` has completed.
    pub async fn closed(&self) {
        self.inner.finished.cancelled().await;
    }

    pub(crate) fn report_error(&self, err: &WsMuxError) {
        if let Some(hook) = &self.inner.on_error {
            hook(self, err);
        }
    }

    pub(crate) fn count_handshake(&self, kind: &str, outcome: &str) {
        self.inner
            .metrics
            .handshakes
            .inc(&[("kind", kind), ("outcome", outcome)]);
    }

    /// Per (namespace, room) lock serializing local handshakes. The entry is
    /// dropped with the last guard.
    pub(crate) async fn lock_process(&self, namespace: &str, room: &str) -> ProcessGuard {
        let key = (namespace.to_owned(), room.to_owned());
        let process = self.inner.processes.entry(key.clone()).or_default().clone();
        let guard = process.lock_owned().await;
        ProcessGuard {
            conn: self.clone(),
            key,
            guard: Some(guard),
        }
    }

    fn begin_connect(&self, namespace: &str) {
        lock(&self.inner.connecting).insert(namespace.to_owned(), Vec::new());
    }

    fn abort_connect(&self, namespace: &str) {
        let dropped = lock(&self.inner.connecting).remove(namespace);
        if let Some(dropped) = dropped.filter(|d| !d.is_empty()) {
            debug!(conn = %self.inner.id, namespace, count = dropped.len(), "dropping queued messages");
        }
    }

    /// Insert `ns` unless the namespace is already connected. Returns the
    /// connected handle, messages queued during the handshake and whether
    /// `ns` was inserted.
    pub(crate) fn commit_namespace(&self, ns: NSConn) -> (NSConn, Vec<Message>, bool) {
        let mut connecting = lock(&self.inner.connecting);
        let queued = connecting.remove(ns.namespace()).unwrap_or_default();
        let mut connected = write(&self.inner.connected);
        match connected.get(ns.namespace()) {
            Some(existing) => (existing.clone(), queued, false),
            None => {
                connected.insert(ns.namespace().to_owned(), ns.clone());
                (ns, queued, true)
            }
        }
    }

    pub(crate) fn remove_namespace(&self, namespace: &str) -> Option<NSConn> {
        write(&self.inner.connected).remove(namespace)
    }

    pub(crate) fn route(&self, msg: Message) -> Route {
        let mut connecting = lock(&self.inner.connecting);
        if let Some(queue) = connecting.get_mut(&msg.namespace) {
            queue.push(msg);
            return Route::Queued;
        }
        let ns = read(&self.inner.connected).get(&msg.namespace).cloned();
        drop(connecting);
        match ns {
            Some(ns) => Route::Ready(ns, msg),
            None => Route::Missing(msg),
        }
    }

    pub(crate) async fn subscribe(&self, namespace: &str) {
        if let Some(exchange) = &self.inner.exchange {
            exchange.subscribe(self, namespace).await;
        }
    }

    pub(crate) async fn unsubscribe(&self, namespace: &str) {
        if let Some(exchange) = &self.inner.exchange {
            exchange.unsubscribe(self, namespace).await;
        }
    }
}

pub(crate) struct ProcessGuard {
    conn: Conn,
    key: (String, String),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        // Release the lock first so our own clone no longer counts.
        self.guard.take();
        self.conn
            .inner
            .processes
            .remove_if(&self.key, |_, process| Arc::strong_count(process) == 1);
    }
}

pub(crate) fn outcome_of(err: &WsMuxError) -> &'static str {
    match err {
        WsMuxError::BadNamespace => "bad_namespace",
        WsMuxError::Timeout | WsMuxError::Cancelled => "timeout",
        e if e.is_close_error() => "closed",
        _ => "rejected",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::time::Duration;

    use super::*;
    use crate::dispatch::Events;
    use crate::transport::memory::{pipe, MemorySocket};

    fn started(socket: MemorySocket, is_client: bool) -> Conn {
        let conn = Conn::new(
            Arc::new(socket),
            ConnOptions {
                id: "conn-1".to_owned(),
                is_client,
                namespaces: Namespaces::builder().namespace("default", Events::new()).build(),
                config: ConnectionConfig::default(),
                on_error: None,
                exchange: None,
                metrics: Arc::new(EngineMetrics::default()),
                server: None,
                on_close: None,
            },
        );
        conn.start();
        conn
    }

    #[tokio::test]
    async fn handshake_locks_do_not_accumulate() {
        let (a, b) = pipe();
        let client = started(a, true);
        let _server = started(b, false);
        let ctx = Ctx::with_timeout(Duration::from_secs(2));

        let ns = client.connect(&ctx, "default").await.unwrap();
        for i in 0..8 {
            let room = format!("room{i}");
            ns.join_room(&ctx, &room).await.unwrap();
            ns.leave_room(&ctx, &room).await.unwrap();
        }
        ns.disconnect(&ctx).await.unwrap();

        assert!(client.inner.processes.is_empty());
    }
}
