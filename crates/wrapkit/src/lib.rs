//! Top-level facade crate for wrapkit.
//!
//! Re-exports the core taxonomy/call model and the composition engine so users
//! can depend on a single crate.

pub mod core {
    pub use wrapkit_core::*;
}

pub mod engine {
    pub use wrapkit_engine::*;
}
