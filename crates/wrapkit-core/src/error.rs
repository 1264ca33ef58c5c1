//! Failure taxonomy shared across wrapkit crates.
//!
//! Kinds form an explicit tree (`Kind::parent`), so a handler written against a
//! general kind also matches every descendant raised anywhere in a composed
//! chain. Downstream code extends the tree by declaring more `static` kinds:
//!
//! ```
//! use wrapkit_core::error::{Error, Kind, ROOT};
//!
//! static STORAGE: Kind = Kind::child("StorageError", &ROOT);
//! static ROW_MISSING: Kind = Kind::child("RowMissingError", &STORAGE);
//!
//! let err = Error::new(&ROW_MISSING, "post 7 not found");
//! assert!(err.is(&STORAGE));
//! assert!(err.is(&ROOT));
//! ```
//!
//! Kinds are compared by address. Declare them as `static`, never `const`.

use std::fmt;
use std::sync::Arc;

use crate::call::Value;

/// One node of the failure tree.
#[derive(Debug)]
pub struct Kind {
    name: &'static str,
    parent: Option<&'static Kind>,
}

impl Kind {
    /// A kind with no ancestor.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// A kind that is caught by every handler for `parent`.
    pub const fn child(name: &'static str, parent: &'static Kind) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// Stable kind name, e.g. `AccessDeniedError`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Declared parent, `None` for the root.
    pub fn parent(&self) -> Option<&'static Kind> {
        self.parent
    }

    /// True if `self` is `ancestor` or descends from it.
    pub fn is_a(&self, ancestor: &Kind) -> bool {
        let mut cur: Option<&Kind> = Some(self);
        while let Some(k) = cur {
            if std::ptr::eq(k, ancestor) {
                return true;
            }
            cur = k.parent;
        }
        false
    }

    /// Path from this kind up to its root, self first.
    pub fn lineage(&self) -> Vec<&'static str> {
        let mut out = vec![self.name];
        let mut cur = self.parent;
        while let Some(k) = cur {
            out.push(k.name);
            cur = k.parent;
        }
        out
    }
}

impl PartialEq for Kind {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Kind {}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Root of every failure the framework raises.
pub static ROOT: Kind = Kind::root("WrapkitError");
/// Guard rejected the caller's principal.
pub static ACCESS_DENIED: Kind = Kind::child("AccessDeniedError", &ROOT);
/// Arguments cannot be fingerprinted deterministically.
pub static NOT_CACHEABLE: Kind = Kind::child("NotCacheableError", &ROOT);
/// Wrapper chain is invalid.
pub static COMPOSITION: Kind = Kind::child("CompositionError", &ROOT);
/// Wrap-time or construction-time misuse.
pub static CONFIGURATION: Kind = Kind::child("ConfigurationError", &ROOT);
/// Computation was abandoned before it produced an outcome.
pub static CANCELLED: Kind = Kind::child("CancelledError", &ROOT);
/// A timeout layer gave up waiting.
pub static TIMEOUT: Kind = Kind::child("TimeoutError", &ROOT);
/// Arguments do not match the declared signature.
pub static ARGUMENT: Kind = Kind::child("ArgumentError", &ROOT);

/// How callers should treat a failure (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Misuse; retrying cannot help.
    Fatal,
    /// Expected failure the caller may handle or retry.
    Recoverable,
}

impl Disposition {
    /// String representation used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::Fatal => "FATAL",
            Disposition::Recoverable => "RECOVERABLE",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, Error>;

/// A taxonomy node instance: kind, message, structured fields, optional cause.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: &'static Kind,
    message: String,
    fields: Vec<(String, Value)>,
    #[source]
    cause: Option<Arc<Error>>,
}

impl Error {
    /// Error of any kind, including user-declared ones.
    pub fn new(kind: &'static Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fields: Vec::new(),
            cause: None,
        }
    }

    /// `ACCESS_DENIED` error.
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(&ACCESS_DENIED, message)
    }

    /// `NOT_CACHEABLE` error.
    pub fn not_cacheable(message: impl Into<String>) -> Self {
        Self::new(&NOT_CACHEABLE, message)
    }

    /// `COMPOSITION` error.
    pub fn composition(message: impl Into<String>) -> Self {
        Self::new(&COMPOSITION, message)
    }

    /// `CONFIGURATION` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(&CONFIGURATION, message)
    }

    /// `CANCELLED` error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(&CANCELLED, message)
    }

    /// `TIMEOUT` error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(&TIMEOUT, message)
    }

    /// `ARGUMENT` error.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(&ARGUMENT, message)
    }

    /// Attach the failure that led to this one.
    pub fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach a structured field (e.g. the offending value).
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Re-raise with extra context. The kind is kept so ancestry handlers still
    /// match, and the original becomes the cause.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            message: message.into(),
            fields: Vec::new(),
            cause: Some(Arc::new(self)),
        }
    }

    /// Leaf kind of this error (not of its causes).
    pub fn kind(&self) -> &'static Kind {
        self.kind
    }

    /// Human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured context attached with `with_field`.
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Look up one structured field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Directly wrapped error, if any.
    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    /// Ancestry test on this node's own kind.
    pub fn is(&self, kind: &Kind) -> bool {
        self.kind.is_a(kind)
    }

    /// First node in the cause chain (self included) whose kind descends from `kind`.
    pub fn find(&self, kind: &Kind) -> Option<&Error> {
        self.chain().find(|e| e.is(kind))
    }

    /// Iterate self, then each cause outward to inward.
    pub fn chain(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |e| e.cause())
    }

    /// Fatal for misuse kinds, recoverable otherwise.
    pub fn disposition(&self) -> Disposition {
        if self.is(&CONFIGURATION) || self.is(&COMPOSITION) || self.is(&ARGUMENT) {
            Disposition::Fatal
        } else {
            Disposition::Recoverable
        }
    }
}
