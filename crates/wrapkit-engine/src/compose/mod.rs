//! Decorator composition engine.
//!
//! `compose(f, [w1, w2, w3])` behaves like `w1(w2(w3(f)))`: the last factory
//! wraps the base first, the first factory is outermost. A call therefore
//! enters `w1` first and `w1` is the last to see the outcome on the way back.
//! Each layer decides whether and how to invoke the next one (a cache hit or
//! a denied guard never reaches the base).

use std::sync::Arc;

use async_trait::async_trait;

use wrapkit_core::call::{Args, Signature, Value};
use wrapkit_core::error::{Error, Result};

use crate::callable::Callable;

/// Wrapper factory: turns one callable into another with the same signature.
///
/// Parameterized factories (`memoize(opts)`, `require_role(role)`, ...) are
/// ordinary constructors that validate their configuration and return a
/// `Wrapper`; `compose` does not distinguish them.
pub trait Wrapper: Send + Sync {
    /// Short label used in logs and `Composed::layers`.
    fn name(&self) -> &str;

    /// Build the layer around `inner`. Wrap-time misuse surfaces here.
    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>>;
}

/// Single invocable produced by layering wrappers around a base callable.
pub struct Composed {
    signature: Signature,
    layers: Vec<String>,
    entry: Arc<dyn Callable>,
}

impl Composed {
    /// Name of the base callable.
    pub fn name(&self) -> &str {
        self.signature.name()
    }

    /// Signature of the base callable.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Wrapper names, outermost first.
    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    /// Invoke the chain. Arguments are checked against the base signature
    /// before any layer runs.
    pub async fn invoke(&self, args: Args) -> Result<Value> {
        self.signature.check(&args)?;
        self.entry.call(args).await
    }
}

#[async_trait]
impl Callable for Composed {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(&self, args: Args) -> Result<Value> {
        self.invoke(args).await
    }
}

/// Apply `wrappers` around `base`, innermost last.
///
/// `base` is only referenced; the caller's handle stays usable on its own.
pub fn compose(base: Arc<dyn Callable>, wrappers: &[Arc<dyn Wrapper>]) -> Result<Composed> {
    let signature = base.signature().clone();
    let mut current = base;

    for w in wrappers.iter().rev() {
        let next = w.wrap(Arc::clone(&current))?;
        if next.signature() != current.signature() {
            return Err(Error::composition(format!(
                "wrapper `{}` changed the signature of `{}`",
                w.name(),
                signature.name()
            ))
            .with_field("wrapper", w.name())
            .with_field("function", signature.name()));
        }
        current = next;
    }

    let layers: Vec<String> = wrappers.iter().map(|w| w.name().to_string()).collect();
    tracing::debug!(function = %signature.name(), layers = ?layers, "composed");

    Ok(Composed {
        signature,
        layers,
        entry: current,
    })
}

/// Builder over `compose` that accepts concrete wrapper types.
pub struct Composer {
    base: Arc<dyn Callable>,
    wrappers: Vec<Arc<dyn Wrapper>>,
}

impl Composer {
    pub fn new(base: Arc<dyn Callable>) -> Self {
        Self {
            base,
            wrappers: Vec::new(),
        }
    }

    /// Add the next layer. Earlier calls end up further out.
    pub fn with<W: Wrapper + 'static>(mut self, w: W) -> Self {
        self.wrappers.push(Arc::new(w));
        self
    }

    /// Add a layer from an already shared factory.
    pub fn with_shared(mut self, w: Arc<dyn Wrapper>) -> Self {
        self.wrappers.push(w);
        self
    }

    /// Compose the collected layers.
    pub fn build(self) -> Result<Composed> {
        compose(self.base, &self.wrappers)
    }
}
