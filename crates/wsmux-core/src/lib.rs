//! wsmux core: transport-agnostic protocol primitives, error types, and the
//! socket capability trait.
//!
//! This crate defines the wire-level contracts shared by the engine, the
//! transport adapters and test tooling. It carries no runtime dependency so
//! the codec can be reused (and fuzzed) outside of Tokio.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed frames
//! are reported through `Message::is_invalid` or `WsMuxError`, never by
//! panicking on hostile input.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;
pub mod socket;

/// Error surface and the shared `Result` alias.
pub use error::{ErrorCode, Result, WsMuxError};
pub use protocol::message::Message;
pub use socket::{Frame, Socket};
