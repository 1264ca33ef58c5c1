//! Stateless instrumentation layers: logging, timing, timeouts.
//!
//! None of these touch shared mutable state beyond their sinks, so they need
//! no synchronization of their own.

pub mod log;
pub mod time;
pub mod timeout;

pub use log::{log_calls, CallRecord, CallSink, LogCalls, TracingSink};
pub use time::{time_calls, Clock, ManualClock, SystemClock, TimeCalls, TimingSink, TracingTimer};
pub use timeout::{timeout, Timeout};
