//! wrapkit core: failure taxonomy and the dynamic invocation model.
//!
//! This crate defines the contracts shared by the composition engine and by
//! user code: typed failures with explicit ancestry, argument/result values,
//! declared signatures, and deterministic argument fingerprints. It does not
//! depend on an async runtime, so it can be reused in any execution context.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here.
//! All fallible paths surface as `Error`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod call;
pub mod error;

/// Shared result type.
pub use error::{Error, Kind, Result};
