//! Server/client connection hooks.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use wsmux_core::error::{Result, WsMuxError};

use crate::conn::Conn;

/// Runs before a server connection becomes visible; an error rejects it.
pub type ConnectHook = Arc<dyn Fn(Conn) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Runs once the server has dropped a closed connection from its live set.
pub type DisconnectHook = Arc<dyn Fn(Conn) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives dispatch errors and malformed frames; never fatal.
pub type ErrorHook = Arc<dyn Fn(&Conn, &WsMuxError) + Send + Sync>;

pub(crate) fn connect_hook<F, Fut>(f: F) -> ConnectHook
where
    F: Fn(Conn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |conn| f(conn).boxed())
}

pub(crate) fn disconnect_hook<F, Fut>(f: F) -> DisconnectHook
where
    F: Fn(Conn) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |conn| f(conn).boxed())
}
