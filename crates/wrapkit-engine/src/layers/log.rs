use std::sync::Arc;

use async_trait::async_trait;

use wrapkit_core::call::{Args, Signature, Value};
use wrapkit_core::error::Result;

use crate::callable::Callable;
use crate::compose::Wrapper;

/// One completed invocation as seen by a logging sink.
#[derive(Debug)]
pub struct CallRecord<'a> {
    pub name: &'a str,
    pub args: &'a Args,
    pub outcome: &'a Result<Value>,
}

/// Receiver of (name, arguments, outcome) tuples.
pub trait CallSink: Send + Sync {
    fn record(&self, record: &CallRecord<'_>);
}

/// Default sink: one `tracing` event per call.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl CallSink for TracingSink {
    fn record(&self, r: &CallRecord<'_>) {
        match r.outcome {
            Ok(v) => tracing::info!(function = %r.name, args = ?r.args, result = ?v, "call ok"),
            Err(e) => tracing::info!(
                function = %r.name,
                args = ?r.args,
                kind = %e.kind(),
                error = %e,
                "call failed"
            ),
        }
    }
}

/// `log_calls()`: report every call's arguments and outcome to a sink.
pub fn log_calls() -> LogCalls {
    LogCalls {
        sink: Arc::new(TracingSink),
    }
}

pub struct LogCalls {
    sink: Arc<dyn CallSink>,
}

impl LogCalls {
    /// Send records to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn CallSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Wrapper for LogCalls {
    fn name(&self) -> &str {
        "log_calls"
    }

    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>> {
        Ok(Arc::new(Logged {
            inner,
            sink: Arc::clone(&self.sink),
        }))
    }
}

struct Logged {
    inner: Arc<dyn Callable>,
    sink: Arc<dyn CallSink>,
}

#[async_trait]
impl Callable for Logged {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, args: Args) -> Result<Value> {
        let shown = args.clone();
        let outcome = self.inner.call(args).await;
        self.sink.record(&CallRecord {
            name: self.name(),
            args: &shown,
            outcome: &outcome,
        });
        outcome
    }
}
