//! Connection state machine.
//!
//! - `Conn`: one socket, its read/write/dispatch tasks and the table of
//!   connected namespaces.
//! - `NSConn`: one connected namespace and its joined rooms.
//! - `Room`: handle to a joined room.
//!
//! Parent handles point down (`Room` -> `NSConn` -> `Conn`); `Conn` owns its
//! namespaces until `close()` drains them, which breaks the cycle.

mod connection;
mod handshake;
mod nsconn;
mod room;
mod wait;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use connection::Conn;
pub(crate) use connection::ConnOptions;
pub use nsconn::NSConn;
pub use room::Room;

// Poison-tolerant lock helpers.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}
