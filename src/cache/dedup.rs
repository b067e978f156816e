// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Keyed in-flight request deduplication.
//!
//! While a request for a key is pending, every further request for that key
//! joins it and observes the same settled value. The registry entry is removed
//! by the request itself when it settles, so the next call starts fresh. This
//! is execution deduplication only: results are never retained.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

/// Handle to a (possibly joined) in-flight request.
pub type InFlight<T> = Shared<BoxFuture<'static, T>>;

struct Entry {
    generation: u64,
    future: Box<dyn Any + Send + Sync>,
}

/// Counters describing deduplication effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupStats {
    /// Requests that started a new execution.
    pub executions: u64,
    /// Requests that joined one already in flight.
    pub joined: u64,
    /// Keys currently in flight.
    pub in_flight: usize,
}

/// Registry of in-flight requests keyed by string.
#[derive(Clone, Default)]
pub struct RequestDeduper {
    inflight: Arc<Mutex<HashMap<String, Entry>>>,
    generation: Arc<AtomicU64>,
    executions: Arc<AtomicU64>,
    joined: Arc<AtomicU64>,
}

impl RequestDeduper {
    /// Empty registry with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` at most once per key while a request for `key` is pending.
    ///
    /// The returned future is registered before this call returns, so a racing
    /// call for the same key always joins it. `f` is invoked under the registry
    /// lock and must not call back into this deduper synchronously.
    pub fn once<T, F, Fut>(&self, key: &str, f: F) -> InFlight<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut inflight = self.registry();

        if let Some(entry) = inflight.get(key) {
            if let Some(shared) = entry.future.downcast_ref::<InFlight<T>>() {
                self.joined.fetch_add(1, Ordering::Relaxed);
                return shared.clone();
            }
            tracing::warn!(key, "In-flight request has a different result type, running unshared");
            self.executions.fetch_add(1, Ordering::Relaxed);
            return f().boxed().shared();
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.inflight);
        let owned_key = key.to_string();
        let work = f();

        let shared = async move {
            let output = work.await;
            let mut inflight = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if inflight
                .get(&owned_key)
                .is_some_and(|e| e.generation == generation)
            {
                inflight.remove(&owned_key);
            }
            output
        }
        .boxed()
        .shared();

        inflight.insert(
            key.to_string(),
            Entry {
                generation,
                future: Box::new(shared.clone()),
            },
        );
        self.executions.fetch_add(1, Ordering::Relaxed);
        shared
    }

    /// Whether a request for `key` is currently pending.
    /// Whether a fetch for `key` is currently running.
    pub fn is_in_flight(&self, key: &str) -> bool {
        self.registry().contains_key(key)
    }

    /// Number of keys with a fetch running.
    pub fn in_flight_count(&self) -> usize {
        self.registry().len()
    }

    /// Executions, joins, and the current in-flight count.
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            executions: self.executions.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            in_flight: self.in_flight_count(),
        }
    }
}

impl std::fmt::Debug for RequestDeduper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDeduper")
            .field("stats", &self.stats())
            .finish()
    }
}
