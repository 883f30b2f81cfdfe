//! Shared fixtures: a server and clients joined by in-memory pipes.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wsmux_core::error::Result;
use wsmux_core::Socket;
use wsmux_engine::transport::memory::pipe;
use wsmux_engine::{Client, ClientOptions, Conn, Ctx, Namespaces, Server};

pub const WAIT: Duration = Duration::from_secs(2);

pub fn ctx() -> Ctx {
    Ctx::with_timeout(WAIT)
}

/// Accept one client on `server` through a fresh pipe.
pub async fn dial(server: &Server, namespaces: Namespaces) -> Result<(Client, Conn)> {
    dial_with(server, namespaces, ClientOptions::default()).await
}

pub async fn dial_with(
    server: &Server,
    namespaces: Namespaces,
    opts: ClientOptions,
) -> Result<(Client, Conn)> {
    let (server_end, client_end) = pipe();
    let server_end: Arc<dyn Socket> = Arc::new(server_end);
    let client_end: Arc<dyn Socket> = Arc::new(client_end);

    let accept = {
        let server = server.clone();
        tokio::spawn(async move { server.serve_socket(server_end).await })
    };
    let client = Client::from_socket(&ctx(), client_end, namespaces, opts).await;
    let conn = accept.await.expect("accept task panicked");
    Ok((client?, conn?))
}

/// Thread-safe event log.
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Poll `cond` until it holds or `WAIT` elapses.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}
