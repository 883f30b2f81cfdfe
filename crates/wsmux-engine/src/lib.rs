//! wsmux engine library entry.
//!
//! This crate wires the connection state machine, event dispatch, server
//! coordination loop, client dialer and transport adapters into a
//! multiplexing stack. It is consumed by the `wsmux-gateway` binary and by
//! integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod config;
pub mod conn;
pub mod ctx;
pub mod dispatch;
pub mod exchange;
pub mod obs;
pub mod ops;
pub mod router;
pub mod server;
pub mod transport;

pub use client::{Client, ClientOptions, Dialer};
pub use conn::{Conn, NSConn, Room};
pub use ctx::Ctx;
pub use dispatch::{reply, Events, HandlerResult, Namespaces};
pub use exchange::{StackExchange, StackExchanges};
pub use server::{Server, ServerBuilder};
