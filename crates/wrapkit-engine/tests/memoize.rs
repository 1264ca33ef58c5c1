//! Memo cache correctness, single-flight, failure and cancellation handling.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use wrapkit_core::args;
use wrapkit_core::call::{Args, Fingerprint, Opaque, ParamKind, Signature, Value};
use wrapkit_core::error::{Error, CANCELLED, CONFIGURATION, NOT_CACHEABLE, TIMEOUT};
use wrapkit_engine::callable::{callable, sync_callable, Callable};
use wrapkit_engine::compose::{compose, Composed, Composer, Wrapper};
use wrapkit_engine::layers::timeout;
use wrapkit_engine::memo::{memoize, MemoCache, MemoOptions, NotCacheablePolicy};

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

/// `double(n)`, counting executions.
fn double(calls: &Arc<AtomicUsize>) -> Arc<dyn Callable> {
    let calls = Arc::clone(calls);
    sync_callable(Signature::new("double").param("n", ParamKind::Int), move |args| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Int(args.get(0).and_then(Value::as_i64).unwrap_or(0) * 2))
    })
}

/// Async `double(n)` that sleeps before answering.
fn slow_double(calls: &Arc<AtomicUsize>, delay: Duration) -> Arc<dyn Callable> {
    let calls = Arc::clone(calls);
    callable(Signature::new("slow_double").param("n", ParamKind::Int), move |args| {
        let calls = Arc::clone(&calls);
        let n = args.get(0).and_then(Value::as_i64).unwrap_or(0);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(Value::Int(n * 2))
        }
    })
}

fn memoized(base: Arc<dyn Callable>, opts: MemoOptions) -> Arc<Composed> {
    Arc::new(Composer::new(base).with(memoize(opts).unwrap()).build().unwrap())
}

#[tokio::test]
async fn repeated_args_execute_once() {
    let calls = counter();
    let f = memoized(double(&calls), MemoOptions::new());

    assert_eq!(f.invoke(args![21]).await.unwrap(), Value::Int(42));
    assert_eq!(f.invoke(args![21]).await.unwrap(), Value::Int(42));
    assert_eq!(f.invoke(args![21]).await.unwrap(), Value::Int(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_fingerprints_execute_once_each() {
    let calls = counter();
    let f = memoized(double(&calls), MemoOptions::new());

    for n in [1, 2, 3, 1, 2, 3] {
        assert_eq!(f.invoke(args![n]).await.unwrap(), Value::Int(i64::from(n) * 2));
    }
    // Positional vs named binding of the same value are different fingerprints.
    f.invoke(Args::new().named_arg("n", 1)).await.unwrap();
    f.invoke(Args::new().named_arg("n", 1)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_execution() {
    let calls = counter();
    let f = memoized(slow_double(&calls, Duration::from_millis(100)), MemoOptions::new());
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let handles = (0..16).map(|_| {
        let f = Arc::clone(&f);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            f.invoke(args![21]).await
        })
    });

    for out in join_all(handles).await {
        assert_eq!(out.unwrap().unwrap(), Value::Int(42));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_failure() {
    let calls = counter();
    let c = Arc::clone(&calls);
    let base = callable(Signature::new("unstable").param("n", ParamKind::Int), move |_| {
        let c = Arc::clone(&c);
        async move {
            let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Err(Error::new(&wrapkit_core::error::ROOT, format!("attempt {attempt} failed")))
        }
    });
    let f = memoized(base, MemoOptions::new());
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let handles = (0..16).map(|_| {
        let f = Arc::clone(&f);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            f.invoke(args![7]).await
        })
    });

    for out in join_all(handles).await {
        let err = out.unwrap().unwrap_err();
        assert_eq!(err.message(), "attempt 1 failed");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The failure was shared, not stored.
    let err = f.invoke(args![7]).await.unwrap_err();
    assert_eq!(err.message(), "attempt 2 failed");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_keys_do_not_serialize() {
    let calls = counter();
    let f = memoized(slow_double(&calls, Duration::from_millis(200)), MemoOptions::new());

    let started = std::time::Instant::now();
    let handles = (0..8).map(|n| {
        let f = Arc::clone(&f);
        tokio::spawn(async move { f.invoke(args![n]).await })
    });
    for out in join_all(handles).await {
        out.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert!(started.elapsed() < Duration::from_millis(1_000));
}

fn flaky(calls: &Arc<AtomicUsize>) -> Arc<dyn Callable> {
    let calls = Arc::clone(calls);
    sync_callable(Signature::new("flaky").param("n", ParamKind::Int), move |_| {
        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::new(&wrapkit_core::error::ROOT, "transient"))
        } else {
            Ok(Value::Str("recovered".into()))
        }
    })
}

#[tokio::test]
async fn failures_are_not_cached_by_default() {
    let calls = counter();
    let f = memoized(flaky(&calls), MemoOptions::new());

    assert!(f.invoke(args![1]).await.is_err());
    assert_eq!(f.invoke(args![1]).await.unwrap(), Value::Str("recovered".into()));
    assert_eq!(f.invoke(args![1]).await.unwrap(), Value::Str("recovered".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failures_can_be_cached_on_request() {
    let calls = counter();
    let f = memoized(flaky(&calls), MemoOptions::new().cache_failures(true));

    let first = f.invoke(args![1]).await.unwrap_err();
    let second = f.invoke(args![1]).await.unwrap_err();
    assert_eq!(first.message(), "transient");
    assert_eq!(second.message(), "transient");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cooperative_cancellation_is_never_cached() {
    let calls = counter();
    let c = Arc::clone(&calls);
    let base = sync_callable(Signature::new("gives_up"), move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Err(Error::cancelled("stopped early"))
    });
    let f = memoized(base, MemoOptions::new().cache_failures(true));

    assert!(f.invoke(args![]).await.unwrap_err().is(&CANCELLED));
    assert!(f.invoke(args![]).await.unwrap_err().is(&CANCELLED));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

fn takes_anything(calls: &Arc<AtomicUsize>) -> Arc<dyn Callable> {
    let calls = Arc::clone(calls);
    sync_callable(Signature::new("inspect").param("x", ParamKind::Any), move |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Bool(true))
    })
}

#[tokio::test]
async fn opaque_args_fail_by_default() {
    let calls = counter();
    let f = memoized(takes_anything(&calls), MemoOptions::new());

    let err = f
        .invoke(args![Opaque::new("socket", 7_u8)])
        .await
        .unwrap_err();
    assert!(err.is(&NOT_CACHEABLE));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn opaque_args_bypass_when_configured() {
    let calls = counter();
    let cache = Arc::new(MemoCache::unbounded());
    let f = memoized(
        takes_anything(&calls),
        MemoOptions::new()
            .on_not_cacheable(NotCacheablePolicy::Bypass)
            .shared(Arc::clone(&cache)),
    );

    let handle = Opaque::new("socket", 7_u8);
    assert_eq!(f.invoke(args![handle.clone()]).await.unwrap(), Value::Bool(true));
    assert_eq!(f.invoke(args![handle]).await.unwrap(), Value::Bool(true));

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.stats().bypassed, 2);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn custom_key_fn_controls_identity() {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let base = sync_callable(
        Signature::new("lookup")
            .param("id", ParamKind::Str)
            .param("trace", ParamKind::Int),
        move |args| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(args.get(0).cloned().unwrap_or_default())
        },
    );
    let f = memoized(
        base,
        MemoOptions::new().key_fn(|a: &Args| {
            Ok(Fingerprint::from_key(a.get(0).and_then(Value::as_str).unwrap_or("")))
        }),
    );

    f.invoke(args!["a", 1]).await.unwrap();
    f.invoke(args!["a", 2]).await.unwrap();
    f.invoke(args!["b", 1]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn key_fn_can_refuse_with_not_cacheable() {
    let calls = counter();
    let f = memoized(
        double(&calls),
        MemoOptions::new()
            .key_fn(|_: &Args| Err(Error::not_cacheable("never cache this")))
            .on_not_cacheable(NotCacheablePolicy::Bypass),
    );

    f.invoke(args![1]).await.unwrap();
    f.invoke(args![1]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bounded_cache_evicts_oldest_entry() {
    let calls = counter();
    let cache = Arc::new(MemoCache::bounded(2).unwrap());
    let f = memoized(double(&calls), MemoOptions::new().shared(Arc::clone(&cache)));

    f.invoke(args![1]).await.unwrap();
    f.invoke(args![2]).await.unwrap();
    f.invoke(args![3]).await.unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.stats().evictions, 1);
    assert!(!cache.contains(&Fingerprint::of(&args![1]).unwrap()));
    assert!(cache.contains(&Fingerprint::of(&args![3]).unwrap()));

    // 2 and 3 are still cached; 1 was evicted and recomputes.
    f.invoke(args![2]).await.unwrap();
    f.invoke(args![3]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    f.invoke(args![1]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn max_entries_builds_a_private_bounded_cache() {
    let calls = counter();
    let f = memoized(double(&calls), MemoOptions::new().max_entries(1));

    f.invoke(args![1]).await.unwrap();
    f.invoke(args![2]).await.unwrap();
    f.invoke(args![1]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn clear_forgets_resolved_entries() {
    let calls = counter();
    let cache = Arc::new(MemoCache::unbounded());
    let f = memoized(double(&calls), MemoOptions::new().shared(Arc::clone(&cache)));

    f.invoke(args![5]).await.unwrap();
    assert_eq!(cache.len(), 1);
    cache.clear();
    assert!(cache.is_empty());

    f.invoke(args![5]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = cache.stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 0);
}

#[tokio::test]
async fn each_composition_owns_its_cache() {
    let calls = counter();
    let base = double(&calls);
    let memo: Arc<dyn Wrapper> = Arc::new(memoize(MemoOptions::new()).unwrap());

    let f1 = compose(Arc::clone(&base), &[Arc::clone(&memo)]).unwrap();
    let f2 = compose(Arc::clone(&base), &[memo]).unwrap();

    f1.invoke(args![9]).await.unwrap();
    f1.invoke(args![9]).await.unwrap();
    f2.invoke(args![9]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn timed_out_leader_releases_its_marker() {
    let calls = counter();
    let cache = Arc::new(MemoCache::unbounded());
    let f = Composer::new(slow_double(&calls, Duration::from_millis(500)))
        .with(timeout(Duration::from_millis(20)).unwrap())
        .with(memoize(MemoOptions::new().shared(Arc::clone(&cache))).unwrap())
        .build()
        .unwrap();

    assert!(f.invoke(args![1]).await.unwrap_err().is(&TIMEOUT));
    assert!(cache.is_empty());

    // A stuck marker would make this call wait instead of computing.
    assert!(f.invoke(args![1]).await.unwrap_err().is(&TIMEOUT));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn waiters_see_cancellation_when_leader_is_dropped() {
    let calls = counter();
    let f = memoized(slow_double(&calls, Duration::from_secs(5)), MemoOptions::new());

    let leader = {
        let f = Arc::clone(&f);
        tokio::spawn(async move { f.invoke(args![1]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let waiter = {
        let f = Arc::clone(&f);
        tokio::spawn(async move { f.invoke(args![1]).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    leader.abort();
    let err = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter must wake")
        .unwrap()
        .unwrap_err();
    assert!(err.is(&CANCELLED));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_memo_options_fail_at_construction() {
    let err = memoize(MemoOptions::new().max_entries(0)).err().unwrap();
    assert!(err.is(&CONFIGURATION));

    let err = memoize(
        MemoOptions::new()
            .shared(Arc::new(MemoCache::unbounded()))
            .max_entries(4),
    )
    .err()
    .unwrap();
    assert!(err.is(&CONFIGURATION));

    assert!(MemoCache::bounded(0).err().unwrap().is(&CONFIGURATION));
}
