//! Top-level facade crate for wsmux.
//!
//! Re-exports the protocol primitives and the engine so users can depend on
//! a single crate.

pub mod core {
    pub use wsmux_core::*;
}

pub mod engine {
    pub use wsmux_engine::*;
}
