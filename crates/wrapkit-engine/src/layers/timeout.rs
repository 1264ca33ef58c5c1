use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use wrapkit_core::call::{Args, Signature, Value};
use wrapkit_core::error::{Error, Result};

use crate::callable::Callable;
use crate::compose::Wrapper;

/// Parameterized factory: `timeout(limit)`.
///
/// On expiry the inner future is dropped, which cancels whatever it was
/// doing (including releasing a memo in-flight marker), and the caller gets
/// `TimeoutError`.
pub fn timeout(limit: Duration) -> Result<Timeout> {
    if limit.is_zero() {
        return Err(Error::configuration("timeout: limit must be greater than zero"));
    }
    Ok(Timeout { limit })
}

pub struct Timeout {
    limit: Duration,
}

impl Wrapper for Timeout {
    fn name(&self) -> &str {
        "timeout"
    }

    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>> {
        Ok(Arc::new(TimeLimited {
            inner,
            limit: self.limit,
        }))
    }
}

struct TimeLimited {
    inner: Arc<dyn Callable>,
    limit: Duration,
}

#[async_trait]
impl Callable for TimeLimited {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, args: Args) -> Result<Value> {
        match tokio::time::timeout(self.limit, self.inner.call(args)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let limit_ms = i64::try_from(self.limit.as_millis()).unwrap_or(i64::MAX);
                Err(Error::timeout(format!("`{}` exceeded {limit_ms}ms", self.name()))
                    .with_field("limit_ms", limit_ms))
            }
        }
    }
}
