use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use wrapkit_core::call::{Args, Signature, Value};
use wrapkit_core::error::Result;

use crate::callable::Callable;
use crate::compose::Wrapper;

/// Clock source for timing layers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_micros: AtomicU64,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset_micros: AtomicU64::new(0),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        let micros = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        self.offset_micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_micros(self.offset_micros.load(Ordering::Relaxed))
    }
}

/// Receiver of per-call durations.
pub trait TimingSink: Send + Sync {
    /// Called before the inner layer runs.
    fn start(&self, _name: &str) {}

    /// Called exactly once per `start`. A call dropped before completing
    /// reports `ok = false`.
    fn observe(&self, name: &str, elapsed: Duration, ok: bool);
}

/// Default timing sink: a `tracing` debug event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTimer;

impl TimingSink for TracingTimer {
    fn observe(&self, name: &str, elapsed: Duration, ok: bool) {
        tracing::debug!(function = %name, elapsed_us = elapsed.as_micros() as u64, ok, "call timed");
    }
}

/// `time_calls()`: measure each call with a clock and report it to a sink.
pub fn time_calls() -> TimeCalls {
    TimeCalls {
        sink: Arc::new(TracingTimer),
        clock: Arc::new(SystemClock),
    }
}

pub struct TimeCalls {
    sink: Arc<dyn TimingSink>,
    clock: Arc<dyn Clock>,
}

impl TimeCalls {
    /// Report durations to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn TimingSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Measure with `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Wrapper for TimeCalls {
    fn name(&self) -> &str {
        "time_calls"
    }

    fn wrap(&self, inner: Arc<dyn Callable>) -> Result<Arc<dyn Callable>> {
        Ok(Arc::new(Timed {
            inner,
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct Timed {
    inner: Arc<dyn Callable>,
    sink: Arc<dyn TimingSink>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Callable for Timed {
    fn signature(&self) -> &Signature {
        self.inner.signature()
    }

    async fn call(&self, args: Args) -> Result<Value> {
        self.sink.start(self.name());
        let mut span = TimingGuard {
            timed: self,
            started: self.clock.now(),
            armed: true,
        };
        let outcome = self.inner.call(args).await;
        span.finish(outcome.is_ok());
        outcome
    }
}

/// Reports a dropped call as failed so every `start` gets its `observe`.
struct TimingGuard<'a> {
    timed: &'a Timed,
    started: Instant,
    armed: bool,
}

impl TimingGuard<'_> {
    fn finish(&mut self, ok: bool) {
        if !self.armed {
            return;
        }
        self.armed = false;
        let elapsed = self.timed.clock.now().saturating_duration_since(self.started);
        self.timed.sink.observe(self.timed.name(), elapsed, ok);
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.finish(false);
    }
}
