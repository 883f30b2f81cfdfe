//! Protocol modules.
//!
//! - `message`: the unit of exchange, including local-only control flags.
//! - `wire`: the seven-field text framing and its escaping rules.
//! - `events`: reserved lifecycle event names shared by both peers.
//!
//! Decoding never fails loudly: malformed input yields a message marked
//! `is_invalid`, leaving the drop/close decision to the connection layer.

pub mod events;
pub mod message;
pub mod wire;
