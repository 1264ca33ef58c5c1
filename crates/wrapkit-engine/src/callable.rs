//! The "is invocable" capability every base function and wrapper layer satisfies.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use wrapkit_core::call::{Args, Signature, Value};
use wrapkit_core::error::Result;

/// A named, invocable unit. Closures, structs and composed chains all qualify.
#[async_trait]
pub trait Callable: Send + Sync {
    fn signature(&self) -> &Signature;

    fn name(&self) -> &str {
        self.signature().name()
    }

    async fn call(&self, args: Args) -> Result<Value>;
}

/// Closure-backed callable.
pub struct FnCallable<F> {
    signature: Signature,
    f: F,
}

impl<F> FnCallable<F> {
    pub fn new(signature: Signature, f: F) -> Self {
        Self { signature, f }
    }
}

#[async_trait]
impl<F, Fut> Callable for FnCallable<F>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn signature(&self) -> &Signature {
        &self.signature
    }

    async fn call(&self, args: Args) -> Result<Value> {
        (self.f)(args).await
    }
}

/// Wrap an async closure as a shareable callable.
pub fn callable<F, Fut>(signature: Signature, f: F) -> Arc<dyn Callable>
where
    F: Fn(Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnCallable::new(signature, f))
}

/// Wrap a blocking closure. It runs inline on the calling task.
pub fn sync_callable<F>(signature: Signature, f: F) -> Arc<dyn Callable>
where
    F: Fn(Args) -> Result<Value> + Send + Sync + 'static,
{
    callable(signature, move |args| std::future::ready(f(args)))
}
