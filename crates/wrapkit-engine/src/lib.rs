//! wrapkit engine: callable composition and the built-in wrapper factories.
//!
//! This crate wires the composition engine, memoization, access control,
//! logging/timing/timeout layers, metrics and config-driven registry into a
//! cohesive stack. It is consumed by the demo binary (`main.rs`) and by
//! integration tests; `demo` holds the functions it registers.
//!
//! ```no_run
//! # async fn demo() -> wrapkit_core::Result<()> {
//! use wrapkit_core::args;
//! use wrapkit_core::call::{ParamKind, Signature, Value};
//! use wrapkit_engine::prelude::*;
//!
//! let square = sync_callable(Signature::new("square").param("n", ParamKind::Int), |a| {
//!     let n = a.get(0).and_then(Value::as_i64).unwrap_or(0);
//!     Ok(Value::Int(n * n))
//! });
//! let f = Composer::new(square)
//!     .with(log_calls())
//!     .with(memoize(MemoOptions::new())?)
//!     .build()?;
//! assert_eq!(f.invoke(args![4]).await?, Value::Int(16));
//! # Ok(())
//! # }
//! ```

pub mod callable;
pub mod compose;
pub mod config;
pub mod demo;
pub mod layers;
pub mod memo;
pub mod obs;
pub mod policy;
pub mod registry;

pub mod prelude {
    pub use crate::callable::{callable, sync_callable, Callable, FnCallable};
    pub use crate::compose::{compose, Composed, Composer, Wrapper};
    pub use crate::layers::{log_calls, time_calls, timeout};
    pub use crate::memo::{memoize, MemoCache, MemoOptions, NotCacheablePolicy};
    pub use crate::policy::require_role;
    pub use crate::registry::Registry;
}
