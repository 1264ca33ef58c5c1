//! Single-flight memo store.
//!
//! - `fingerprint -> Slot`, sharded by `DashMap`; distinct keys never contend
//!   on one lock.
//! - First caller for a key installs an in-flight marker and computes.
//!   Later callers subscribe to the flight and suspend until it publishes.
//! - Publish is compare-and-set: only the flight that owns the marker may
//!   replace it, so a cleared or abandoned marker is never resurrected.
//! - A leader dropped mid-computation removes its marker; waiters observe
//!   `CancelledError` and the key stays uncached.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;

use wrapkit_core::call::{Fingerprint, Value};
use wrapkit_core::error::{Error, Result, CANCELLED};

type Outcome = Result<Value>;

struct Flight {
    tx: watch::Sender<Option<Outcome>>,
}

enum Slot {
    Ready { outcome: Outcome, seq: u64 },
    InFlight(Arc<Flight>),
}

impl Slot {
    fn is_flight(&self, flight: &Arc<Flight>) -> bool {
        matches!(self, Slot::InFlight(f) if Arc::ptr_eq(f, flight))
    }
}

enum Role {
    Leader(Arc<Flight>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

/// Counters since construction (or the last `clear`, for `len`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoStats {
    /// Served from a resolved entry or by joining an in-flight computation.
    pub hits: u64,
    /// Computations started.
    pub misses: u64,
    /// Calls that skipped the cache because their arguments were not cacheable.
    pub bypassed: u64,
    pub evictions: u64,
}

/// Memo store owned by one composed callable, or shared explicitly.
pub struct MemoCache {
    slots: DashMap<Fingerprint, Slot>,
    max_entries: Option<usize>,
    seq: AtomicU64,
    ready: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    bypassed: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl MemoCache {
    /// No eviction: entries live as long as the cache.
    pub fn unbounded() -> Self {
        Self::build(None)
    }

    /// Evict the oldest resolved entry once more than `max_entries` are held.
    pub fn bounded(max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::configuration("memo max_entries must be at least 1"));
        }
        Ok(Self::build(Some(max_entries)))
    }

    fn build(max_entries: Option<usize>) -> Self {
        Self {
            slots: DashMap::new(),
            max_entries,
            seq: AtomicU64::new(0),
            ready: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            bypassed: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Configured bound, `None` when unbounded.
    pub fn max_entries(&self) -> Option<usize> {
        self.max_entries
    }

    /// Resolved entries currently held.
    pub fn len(&self) -> usize {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a resolved entry exists for `key`.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.slots
            .get(key)
            .map(|s| matches!(s.value(), Slot::Ready { .. }))
            .unwrap_or(false)
    }

    /// Drop every resolved entry. In-flight computations are left alone.
    pub fn clear(&self) {
        let ready = &self.ready;
        self.slots.retain(|_, slot| match slot {
            Slot::Ready { .. } => {
                ready.fetch_sub(1, Ordering::Relaxed);
                false
            }
            Slot::InFlight(_) => true,
        });
    }

    /// Snapshot of the hit/miss/bypass/eviction counters.
    pub fn stats(&self) -> MemoStats {
        MemoStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn note_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return the outcome for `key`, running `compute` at most once per key
    /// across all concurrent callers.
    pub(crate) async fn resolve<F, Fut>(
        &self,
        key: Fingerprint,
        cache_failures: bool,
        compute: F,
    ) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let role = match self.slots.entry(key.clone()) {
            Entry::Occupied(e) => match e.get() {
                Slot::Ready { outcome, .. } => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(key = ?key, "memo hit");
                    return outcome.clone();
                }
                Slot::InFlight(flight) => Role::Waiter(flight.tx.subscribe()),
            },
            Entry::Vacant(e) => {
                let (tx, _) = watch::channel(None);
                let flight = Arc::new(Flight { tx });
                e.insert(Slot::InFlight(Arc::clone(&flight)));
                Role::Leader(flight)
            }
        };

        match role {
            Role::Waiter(rx) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = ?key, "memo join in-flight");
                join(rx).await
            }
            Role::Leader(flight) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = ?key, "memo miss");

                let mut guard = FlightGuard {
                    cache: self,
                    key: &key,
                    flight: &flight,
                    armed: true,
                };
                let outcome = compute().await;
                guard.armed = false;

                self.publish(&key, &flight, &outcome, cache_failures);
                outcome
            }
        }
    }

    fn publish(&self, key: &Fingerprint, flight: &Arc<Flight>, outcome: &Outcome, cache_failures: bool) {
        let keep = match outcome {
            Ok(_) => true,
            Err(e) if e.is(&CANCELLED) => false,
            Err(_) => cache_failures,
        };

        let mut stored = false;
        if keep {
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            if let Some(mut slot) = self.slots.get_mut(key) {
                if slot.is_flight(flight) {
                    *slot = Slot::Ready {
                        outcome: outcome.clone(),
                        seq,
                    };
                    stored = true;
                }
            }
        } else {
            self.slots.remove_if(key, |_, slot| slot.is_flight(flight));
        }

        if stored {
            self.ready.fetch_add(1, Ordering::Relaxed);
            self.evict_overflow();
        }

        // Waiters wake only after the map reflects the outcome.
        flight.tx.send_replace(Some(outcome.clone()));
    }

    fn abandon(&self, key: &Fingerprint, flight: &Arc<Flight>) {
        if self.slots.remove_if(key, |_, slot| slot.is_flight(flight)).is_some() {
            tracing::debug!(key = ?key, "memo flight abandoned");
        }
    }

    fn evict_overflow(&self) {
        let Some(max) = self.max_entries else { return };

        while self.ready.load(Ordering::Relaxed) > max {
            let oldest = self
                .slots
                .iter()
                .filter_map(|e| match e.value() {
                    Slot::Ready { seq, .. } => Some((*seq, e.key().clone())),
                    Slot::InFlight(_) => None,
                })
                .min_by_key(|(seq, _)| *seq);

            let Some((victim_seq, victim)) = oldest else { break };

            let removed = self.slots.remove_if(&victim, |_, slot| {
                matches!(slot, Slot::Ready { seq, .. } if *seq == victim_seq)
            });
            if removed.is_some() {
                self.ready.fetch_sub(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = ?victim, "memo evicted");
            }
        }
    }
}

async fn join(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
    let waited = rx.wait_for(Option::is_some).await.map(|v| (*v).clone());
    let published = match waited {
        Ok(v) => v,
        // Sender gone; it may still have published right before dropping.
        Err(_) => (*rx.borrow()).clone(),
    };
    published.unwrap_or_else(|| {
        Err(Error::cancelled(
            "in-flight computation for this fingerprint was cancelled",
        ))
    })
}

/// Releases the in-flight marker if the leader is dropped before publishing.
struct FlightGuard<'a> {
    cache: &'a MemoCache,
    key: &'a Fingerprint,
    flight: &'a Arc<Flight>,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.abandon(self.key, self.flight);
        }
    }
}
