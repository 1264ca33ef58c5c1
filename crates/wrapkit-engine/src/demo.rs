//! Built-in demo functions used by `wrapkit-demo` and the sample config.

use std::sync::Arc;
use std::time::Duration;

use wrapkit_core::call::{ParamKind, Signature, Value};
use wrapkit_core::error::Error;

use crate::callable::{callable, sync_callable, Callable};
use crate::registry::Registry;

/// `fib(n: int)`: the n-th Fibonacci number, `ArgumentError` past `i64`.
pub fn fib() -> Arc<dyn Callable> {
    let sig = Signature::new("fib").param("n", ParamKind::Int);
    let shape = sig.clone();
    sync_callable(sig, move |args| {
        let n = args
            .bound(&shape, 0)
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::argument("fib expects an int"))?;
        if n < 0 {
            return Err(Error::argument("fib is undefined for negative n").with_field("n", n));
        }
        if n == 0 {
            return Ok(Value::Int(0));
        }
        let (mut a, mut b) = (0_i64, 1_i64);
        for _ in 1..n {
            let next = a
                .checked_add(b)
                .ok_or_else(|| Error::argument("fib overflows i64").with_field("n", n))?;
            a = b;
            b = next;
        }
        Ok(Value::Int(b))
    })
}

/// `delete_post(principal, id: int)`: pretends to delete a stored post.
pub fn delete_post() -> Arc<dyn Callable> {
    let sig = Signature::new("delete_post")
        .param("principal", ParamKind::Principal)
        .param("id", ParamKind::Int);
    let shape = sig.clone();
    callable(sig, move |args| {
        let id = args.bound(&shape, 1).cloned().unwrap_or_default();
        async move {
            // Simulated storage round-trip.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Value::Record(vec![
                ("deleted".into(), id),
                ("ok".into(), Value::Bool(true)),
            ]))
        }
    })
}

/// Register `fib` and `delete_post`.
pub fn register_demo_functions(registry: &Registry) {
    registry.register_base(fib());
    registry.register_base(delete_post());
}
