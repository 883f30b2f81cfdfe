//! Event dispatch tables and connection hooks.
//!
//! Tables are built once through explicit registration and are immutable
//! afterwards; every connection shares the same `Arc`.

pub mod events;
pub mod hooks;

pub use events::{reply, Events, Handler, HandlerResult, Namespaces, NamespacesBuilder};
pub use hooks::{ConnectHook, DisconnectHook, ErrorHook};
