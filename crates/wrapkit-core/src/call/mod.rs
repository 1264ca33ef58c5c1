//! Invocation model shared by every callable and wrapper.
//!
//! Callables of any arity are driven through one contract: an `Args` value
//! (ordered positional values plus ordered named values) checked against a
//! `Signature`, producing a `Value` or a taxonomy `Error`. No reflection is
//! involved; the signature is declared once and carried through every layer.

pub mod args;
pub mod fingerprint;
pub mod signature;
pub mod value;

pub use args::Args;
pub use fingerprint::Fingerprint;
pub use signature::{Param, ParamKind, Signature};
pub use value::{Opaque, Principal, Value};
