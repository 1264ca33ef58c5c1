//! Memoization wrapper factory.
//!
//! `memoize(options)` validates its options eagerly and returns a `Memoize`
//! factory. Each `wrap` creates a fresh `MemoCache` owned by that composed
//! callable, unless a cache is passed in explicitly through
//! `MemoOptions::shared`.

pub mod cache;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use wrapkit_core::call::{Args, Fingerprint, Signature, Value};
use wrapkit_core::error::{Error, Result, NOT_CACHEABLE};

use crate::callable::Callable;
use crate::compose::Wrapper;

pub use cache::{MemoCache, MemoStats};

/// Custom fingerprint function. Returning `NotCacheableError` follows the
/// configured `NotCacheablePolicy`.
pub type KeyFn = Arc<dyn Fn(&Args) -> Result<Fingerprint> + Send + Sync>;

/// What to do when a call's arguments cannot be fingerprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotCacheablePolicy {
    /// Raise `NotCacheableError` to the caller.
    #[default]
    Fail,
    /// Run the call uncached.
    Bypass,
}

#[derive(Clone, Default)]
pub struct MemoOptions {
    key_fn: Option<KeyFn>,
    cache_failures: bool,
    on_not_cacheable: NotCacheablePolicy,
    max_entries: Option<usize>,
    shared: Option<Arc<MemoCache>>,
}

impl fmt::Debug for MemoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoOptions")
            .field("key_fn", &self.key_fn.as_ref().map(|_| "custom"))
            .field("cache_failures", &self.cache_failures)
            .field("on_not_cacheable", &self.on_not_cacheable)
            .field("max_entries", &self.max_entries)
            .field("shared", &self.shared.is_some())
            .finish()
    }
}

impl MemoOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default fingerprint with a custom key.
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args) -> Result<Fingerprint> + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(f));
        self
    }

    /// Also cache failed outcomes (off by default so transient failures retry).
    pub fn cache_failures(mut self, yes: bool) -> Self {
        self.cache_failures = yes;
        self
    }

    /// Choose how arguments that cannot be fingerprinted are handled.
    pub fn on_not_cacheable(mut self, policy: NotCacheablePolicy) -> Self {
        self.on_not_cacheable = policy;
        self
    }

    /// Bound the cache; the oldest resolved entry is evicted first.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = Some(n);
        self
    }

    /// Use an existing cache instead of creating one per composed callable.
    pub fn shared(mut self, cache: Arc<MemoCache>) -> Self {
        self.shared = Some(cache);
        self
    }
}

/// Parameterized factory: `memoize(options)`.
pub fn memoize(options: MemoOptions) -> Result<Memoize> {
    if options.max_entries == Some(0) {
        return Err(Error::configuration("memoize: max_entries must be at least 1"));
    }
    if options.shared.is_some() && options.max_entries.is_some() {
        return Err(Error::configuration(
            "memoize: max_entries cannot be combined with a shared cache; bound the shared cache instead",
        ));
    }
    Ok(Memoize { options })
}

pub struct Memoize {
    options: MemoOptions,
}

impl Wrapper for Memoize {
    fn name(&self) -> &str {
        "memoize"
    }

    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>> {
        let cache = match (&self.options.shared, self.options.max_entries) {
            (Some(shared), _) => Arc::clone(shared),
            (None, Some(max)) => Arc::new(MemoCache::bounded(max)?),
            (None, None) => Arc::new(MemoCache::unbounded()),
        };
        Ok(Arc::new(Memoized {
            inner,
            cache,
            key_fn: self.options.key_fn.clone(),
            cache_failures: self.options.cache_failures,
            on_not_cacheable: self.options.on_not_cacheable,
        }))
    }
}

struct Memoized {
    inner: Arc<dyn Callable>,
    cache: Arc<MemoCache>,
    key_fn: Option<KeyFn>,
    cache_failures: bool,
    on_not_cacheable: NotCacheablePolicy,
}

#[async_trait]
impl Callable for Memoized {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, args: Args) -> Result<Value> {
        let key = match &self.key_fn {
            Some(f) => f(&args),
            None => Fingerprint::of(&args),
        };

        let key = match key {
            Ok(k) => k,
            Err(e) if e.is(&NOT_CACHEABLE) && self.on_not_cacheable == NotCacheablePolicy::Bypass => {
                tracing::debug!(function = %self.name(), reason = %e, "memo bypass");
                self.cache.note_bypass();
                return self.inner.call(args).await;
            }
            Err(e) => return Err(e),
        };

        let inner = Arc::clone(&self.inner);
        self.cache
            .resolve(key, self.cache_failures, move || async move { inner.call(args).await })
            .await
    }
}
