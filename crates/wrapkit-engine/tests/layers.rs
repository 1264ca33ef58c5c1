//! Logging, timing and timeout layers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wrapkit_core::args;
use wrapkit_core::call::{Args, ParamKind, Signature, Value};
use wrapkit_core::error::{Error, CONFIGURATION, TIMEOUT};
use wrapkit_engine::callable::{callable, sync_callable, Callable};
use wrapkit_engine::compose::Composer;
use wrapkit_engine::layers::{
    log_calls, time_calls, timeout, CallRecord, CallSink, Clock, ManualClock, TimingSink,
};
use wrapkit_engine::obs::CallMetrics;

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, Args, Result<Value, String>)>>,
}

impl CallSink for Recorder {
    fn record(&self, r: &CallRecord<'_>) {
        let outcome = match r.outcome {
            Ok(v) => Ok(v.clone()),
            Err(e) => Err(e.kind().name().to_string()),
        };
        self.seen
            .lock()
            .unwrap()
            .push((r.name.to_string(), r.args.clone(), outcome));
    }
}

fn square() -> Arc<dyn Callable> {
    sync_callable(Signature::new("square").param("n", ParamKind::Int), |args| {
        match args.get(0).and_then(Value::as_i64) {
            Some(n) if n >= 0 => Ok(Value::Int(n * n)),
            _ => Err(Error::argument("negative input")),
        }
    })
}

#[tokio::test]
async fn log_layer_reports_name_args_and_outcome() {
    let sink = Arc::new(Recorder::default());
    let f = Composer::new(square())
        .with(log_calls().with_sink(sink.clone()))
        .build()
        .unwrap();

    f.invoke(args![3]).await.unwrap();
    f.invoke(args![-1]).await.unwrap_err();

    let seen = sink.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "square");
    assert_eq!(seen[0].1, args![3]);
    assert_eq!(seen[0].2, Ok(Value::Int(9)));
    assert_eq!(seen[1].2, Err("ArgumentError".to_string()));
}

#[tokio::test]
async fn time_layer_measures_with_the_injected_clock() {
    let clock = Arc::new(ManualClock::new());
    let metrics = Arc::new(CallMetrics::new());

    let ticking = Arc::clone(&clock);
    let base = sync_callable(Signature::new("work").param("ok", ParamKind::Bool), move |args| {
        ticking.advance(Duration::from_millis(5));
        if args.get(0).and_then(Value::as_bool).unwrap_or(false) {
            Ok(Value::Null)
        } else {
            Err(Error::argument("asked to fail"))
        }
    });

    let f = Composer::new(base)
        .with(
            time_calls()
                .with_clock(clock.clone() as Arc<dyn Clock>)
                .with_sink(metrics.clone() as Arc<dyn TimingSink>),
        )
        .build()
        .unwrap();

    f.invoke(args![true]).await.unwrap();
    f.invoke(args![false]).await.unwrap_err();

    let ok = [("function", "work"), ("outcome", "ok")];
    let failed = [("function", "work"), ("outcome", "error")];
    assert_eq!(metrics.calls.get(&ok), 1);
    assert_eq!(metrics.calls.get(&failed), 1);
    assert_eq!(metrics.call_duration.snapshot(&ok), (1, 5_000));
    assert_eq!(metrics.call_duration.snapshot(&failed), (1, 5_000));
    assert_eq!(metrics.in_flight.get(&[("function", "work")]), 0);

    let text = metrics.render(&[]);
    assert!(text.contains("wrapkit_calls_total{function=\"work\",outcome=\"ok\"} 1"));
    assert!(text.contains("# TYPE wrapkit_call_duration_micros histogram"));
}

#[tokio::test]
async fn time_layer_returns_the_inner_outcome_unchanged() {
    let f = Composer::new(square()).with(time_calls()).build().unwrap();
    assert_eq!(f.invoke(args![4]).await.unwrap(), Value::Int(16));
    assert!(f.invoke(args![-4]).await.is_err());
}

fn sleepy() -> Arc<dyn Callable> {
    callable(Signature::new("sleepy").param("ms", ParamKind::Int), |args| {
        let ms = args.get(0).and_then(Value::as_i64).unwrap_or(0);
        async move {
            tokio::time::sleep(Duration::from_millis(u64::try_from(ms).unwrap_or(0))).await;
            Ok(Value::Int(ms))
        }
    })
}

#[tokio::test]
async fn timeout_layer_limits_slow_calls() {
    let f = Composer::new(sleepy())
        .with(timeout(Duration::from_millis(50)).unwrap())
        .build()
        .unwrap();

    assert_eq!(f.invoke(args![1]).await.unwrap(), Value::Int(1));

    let err = f.invoke(args![2_000]).await.unwrap_err();
    assert!(err.is(&TIMEOUT));
    assert_eq!(err.field("limit_ms"), Some(&Value::Int(50)));
}

#[tokio::test]
async fn timed_calls_cut_short_by_timeout_still_settle_metrics() {
    let metrics = Arc::new(CallMetrics::new());
    let f = Composer::new(sleepy())
        .with(timeout(Duration::from_millis(20)).unwrap())
        .with(time_calls().with_sink(metrics.clone() as Arc<dyn TimingSink>))
        .build()
        .unwrap();

    for _ in 0..3 {
        assert!(f.invoke(args![500]).await.unwrap_err().is(&TIMEOUT));
    }

    assert_eq!(metrics.in_flight.get(&[("function", "sleepy")]), 0);
    let failed = [("function", "sleepy"), ("outcome", "error")];
    assert_eq!(metrics.calls.get(&failed), 3);
    assert_eq!(metrics.call_duration.snapshot(&failed).0, 3);
}

#[test]
fn zero_timeout_is_rejected() {
    assert!(timeout(Duration::ZERO).err().unwrap().is(&CONFIGURATION));
}

#[test]
fn manual_clock_only_moves_when_advanced() {
    let clock = ManualClock::new();
    let t0 = clock.now();
    assert_eq!(clock.now(), t0);
    clock.advance(Duration::from_secs(2));
    assert_eq!(clock.now() - t0, Duration::from_secs(2));
}
