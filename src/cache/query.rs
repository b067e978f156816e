// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Adaptive query cache with TTL expiry, insertion-order eviction, and metrics.
//!
//! An entry is live while `now - inserted_at < ttl`; expired entries are
//! treated as absent and removed on the read that finds them (or by the
//! periodic sweep). When the cache is full, inserting a new key evicts the
//! entry with the oldest insertion time.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::{MonitorError, QueryError};
use crate::task::{PeriodicTask, TaskSlot};
use crate::warning::{self, RuntimeWarning, WarningHandler};

use super::dedup::RequestDeduper;
use super::metrics::{MetricsRing, QueryAnalytics, QueryMetric};

struct CacheEntry {
    data: Arc<dyn Any + Send + Sync>,
    inserted_at: Instant,
    seq: u64,
    ttl: Duration,
    hits: u64,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Overrides the configured default TTL.
    pub ttl: Option<Duration>,
    /// Read from and write to the cache (requires a key).
    pub cache: bool,
    /// Join an identical in-flight fetch instead of starting another (requires a key).
    pub dedupe: bool,
    /// Overrides the configured fetch deadline.
    pub timeout: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            cache: true,
            dedupe: false,
            timeout: None,
        }
    }
}

impl QueryOptions {
    /// Never touch the cache.
    pub fn uncached() -> Self {
        Self {
            cache: false,
            ..Default::default()
        }
    }

    /// Override the cache's default TTL for this query.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Share the fetch with concurrent callers of the same key.
    pub fn dedupe(mut self) -> Self {
        self.dedupe = true;
        self
    }

    /// Fail with `QueryError::Timeout` if the fetch outlives `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome<T> {
    pub data: T,
    /// Served from a live entry without calling the fetch.
    pub from_cache: bool,
}

/// Backend response shape: data, error, or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
}

impl<T> QueryResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: None,
            error: None,
        }
    }

    pub fn err(error: QueryError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }
}

type BatchFetch<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, QueryError>> + Send>;

/// One query in a batch.
pub struct BatchQuery<T> {
    pub key: Option<String>,
    pub options: QueryOptions,
    fetch: BatchFetch<T>,
}

impl<T: 'static> BatchQuery<T> {
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        Self {
            key: None,
            options: QueryOptions::default(),
            fetch: Box::new(move || fetch().boxed()),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }
}

/// Cache occupancy snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub max_size: usize,
    pub total_hits: u64,
}

/// TTL + size-bounded cache in front of an injected fetch function.
pub struct QueryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    metrics: Mutex<MetricsRing>,
    deduper: RequestDeduper,
    config: CacheConfig,
    seq: AtomicU64,
    cleanup: TaskSlot,
    warnings: Option<WarningHandler>,
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_deduper(config, RequestDeduper::new())
    }

    /// Share a deduper with other callers.
    pub fn with_deduper(config: CacheConfig, deduper: RequestDeduper) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            metrics: Mutex::new(MetricsRing::new(config.metrics_capacity)),
            deduper,
            config,
            seq: AtomicU64::new(0),
            cleanup: TaskSlot::new(),
            warnings: None,
        }
    }

    /// Receive slow-query warnings.
    pub fn with_warning_handler(mut self, handler: WarningHandler) -> Self {
        self.warnings = Some(handler);
        self
    }

    /// Configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Deduper used for `dedupe` queries.
    pub fn deduper(&self) -> &RequestDeduper {
        &self.deduper
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics(&self) -> MutexGuard<'_, MetricsRing> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fetch` unless a live cached value exists for `key`.
    ///
    /// Errors from `fetch` are recorded and returned unchanged; nothing is cached.
    pub async fn execute_query<T, F, Fut>(
        &self,
        key: Option<&str>,
        options: QueryOptions,
        fetch: F,
    ) -> Result<QueryOutcome<T>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
    {
        self.run(key, options, fetch, |_| true).await
    }

    /// Like [`execute_query`](Self::execute_query) for backends that report
    /// `{data, error}`. An error becomes `Err`; missing data is returned but
    /// never cached.
    pub async fn execute_response<T, F, Fut>(
        &self,
        key: Option<&str>,
        options: QueryOptions,
        fetch: F,
    ) -> Result<QueryOutcome<Option<T>>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResponse<T>> + Send + 'static,
    {
        let fetch = move || {
            let response = fetch();
            async move {
                let response = response.await;
                match response.error {
                    Some(error) => Err(error),
                    None => Ok(response.data),
                }
            }
        };
        self.run(key, options, fetch, Option::is_some).await
    }

    async fn run<T, F, Fut, P>(
        &self,
        key: Option<&str>,
        options: QueryOptions,
        fetch: F,
        cacheable: P,
    ) -> Result<QueryOutcome<T>, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
        P: FnOnce(&T) -> bool,
    {
        let caching = options.cache && key.is_some();
        let label = key.unwrap_or("anonymous");

        if caching {
            if let Some(data) = key.and_then(|k| self.lookup::<T>(k)) {
                self.record_metric(QueryMetric::new(label, Duration::ZERO, true));
                return Ok(QueryOutcome {
                    data,
                    from_cache: true,
                });
            }
        }

        let deadline = options.timeout.or(self.config.query_timeout());
        let start = Instant::now();
        let result = match key.filter(|_| options.dedupe) {
            Some(k) => {
                self.deduper
                    .once(&format!("query:{}", k), move || with_deadline(fetch(), deadline))
                    .await
            }
            None => with_deadline(fetch(), deadline).await,
        };
        let duration = start.elapsed();

        self.record_metric(QueryMetric::new(label, duration, false));

        if duration > self.config.slow_query_threshold() {
            warning::raise(
                self.warnings.as_ref(),
                RuntimeWarning::SlowQuery {
                    query: label.to_string(),
                    duration_ms: duration.as_secs_f64() * 1000.0,
                },
            );
        }

        let data = result?;
        if let Some(k) = key.filter(|_| caching) {
            if cacheable(&data) {
                self.insert(k, data.clone(), options.ttl);
            }
        }
        Ok(QueryOutcome {
            data,
            from_cache: false,
        })
    }

    /// Run queries in chunks of `batch_concurrency`, preserving input order.
    ///
    /// Each chunk settles completely before the next one starts.
    pub async fn execute_batch<T>(
        &self,
        queries: Vec<BatchQuery<T>>,
    ) -> Vec<Result<QueryOutcome<T>, QueryError>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut results = Vec::with_capacity(queries.len());
        let mut queries = queries.into_iter();

        loop {
            let chunk: Vec<BatchQuery<T>> =
                queries.by_ref().take(self.config.batch_concurrency).collect();
            if chunk.is_empty() {
                break;
            }
            let running = chunk.into_iter().map(|q| async move {
                self.execute_query(q.key.as_deref(), q.options, q.fetch).await
            });
            results.extend(join_all(running).await);
        }
        results
    }

    /// Live cached value for `key`, counting the hit.
    pub fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut entries = self.entries();
        let entry = entries.get_mut(key)?;

        if !entry.is_live(now) {
            entries.remove(key);
            return None;
        }
        match entry.data.downcast_ref::<T>() {
            Some(data) => {
                entry.hits += 1;
                Some(data.clone())
            }
            None => {
                tracing::debug!(key, "Cached value has a different type, treating as miss");
                None
            }
        }
    }

    /// Store a value, evicting the oldest insertion if a new key would exceed capacity.
    pub fn insert<T>(&self, key: &str, data: T, ttl: Option<Duration>)
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self.entries();
        if !entries.contains_key(key) && entries.len() >= self.config.max_size {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| (e.inserted_at, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
                tracing::trace!(evicted = %oldest, "Evicted oldest cache entry");
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                data: Arc::new(data),
                inserted_at: Instant::now(),
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                ttl: ttl.unwrap_or(self.config.default_ttl()),
                hits: 0,
            },
        );
    }

    /// Hit count of a live entry.
    /// Hit count of a live entry.
    pub fn hits(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.entries()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.hits)
    }

    /// Whether `key` has a live entry.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries().get(key).is_some_and(|e| e.is_live(now))
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`. Returns how many.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }

    /// Drop every entry. Metrics are kept.
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Remove every expired entry. Returns how many.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    /// Occupancy and hit totals.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries();
        CacheStats {
            total_entries: entries.len(),
            expired_entries: entries.values().filter(|e| !e.is_live(now)).count(),
            max_size: self.config.max_size,
            total_hits: entries.values().map(|e| e.hits).sum(),
        }
    }

    /// Append a metric produced outside the cache (e.g. an API call).
    pub fn record_external_metric(&self, metric: QueryMetric) {
        self.record_metric(metric);
    }

    fn record_metric(&self, metric: QueryMetric) {
        self.metrics().push(metric);
    }

    /// Snapshot of the metrics ring, oldest first.
    pub fn metrics_snapshot(&self) -> Vec<QueryMetric> {
        self.metrics().iter().cloned().collect()
    }

    /// Hit rate, average duration, and the `top_n` slowest queries.
    pub fn query_analytics(&self, top_n: usize) -> QueryAnalytics {
        self.metrics()
            .analytics(top_n, self.config.slow_query_threshold())
    }

    /// Empty the metrics ring.
    pub fn clear_metrics(&self) {
        self.metrics().clear();
    }

    /// Start the periodic expiry sweep. Errors if it is already running.
    pub fn start_periodic_cleanup(self: &Arc<Self>) -> Result<(), MonitorError> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval();
        self.cleanup.start("cache cleanup", || {
            PeriodicTask::spawn("cache cleanup", period, None, move || {
                let cache = cache.clone();
                async move {
                    match cache.upgrade() {
                        Some(cache) => {
                            let removed = cache.cleanup_expired();
                            if removed > 0 {
                                tracing::debug!(removed, "Swept expired cache entries");
                            }
                            true
                        }
                        None => false,
                    }
                }
            })
        })
    }

    /// Stop the periodic sweep. Errors if it was not running.
    pub async fn stop_periodic_cleanup(&self) -> Result<(), MonitorError> {
        if self.cleanup.stop().await {
            Ok(())
        } else {
            Err(MonitorError::NotRunning("cache cleanup"))
        }
    }

    /// Whether the periodic sweep is active.
    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup.is_running()
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("stats", &self.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn with_deadline<T, Fut>(fut: Fut, deadline: Option<Duration>) -> Result<T, QueryError>
where
    Fut: Future<Output = Result<T, QueryError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(QueryError::Timeout(
                u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            ))),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn cache_with(max_size: usize) -> QueryCache {
        QueryCache::new(CacheConfig {
            max_size,
            ..Default::default()
        })
    }

    fn counted(calls: &Arc<AtomicUsize>, value: u32) -> impl Future<Output = Result<u32, QueryError>> + Send + 'static {
        let calls = Arc::clone(calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_hit_then_miss() {
        let cache = cache_with(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::default().ttl(Duration::from_millis(100));

        let first = cache.execute_query(Some("a"), opts, || counted(&calls, 1)).await.unwrap();
        assert!(!first.from_cache);

        tokio::time::advance(Duration::from_millis(50)).await;
        let second = cache.execute_query(Some("a"), opts, || counted(&calls, 2)).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.data, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits("a"), Some(1));

        tokio::time::advance(Duration::from_millis(100)).await;
        let third = cache.execute_query(Some("a"), opts, || counted(&calls, 3)).await.unwrap();
        assert!(!third.from_cache);
        assert_eq!(third.data, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_removes_oldest_insertion() {
        let cache = cache_with(3);
        for key in ["a", "b", "c"] {
            cache.insert(key, key.to_string(), None);
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        // Reads do not protect an entry: eviction is by insertion time.
        for _ in 0..5 {
            assert!(cache.lookup::<String>("a").is_some());
        }

        cache.insert("d", "d".to_string(), None);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b") && cache.contains("c") && cache.contains("d"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_ties_broken_by_sequence() {
        let cache = cache_with(2);
        cache.insert("first", 1u8, None);
        cache.insert("second", 2u8, None);
        cache.insert("third", 3u8, None);
        assert!(!cache.contains("first"));
        assert!(cache.contains("second"));
    }

    #[tokio::test]
    async fn test_overwrite_does_not_evict() {
        let cache = cache_with(2);
        cache.insert("a", 1u8, None);
        cache.insert("b", 2u8, None);
        cache.insert("a", 10u8, None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup::<u8>("a"), Some(10));
    }

    #[tokio::test]
    async fn test_error_recorded_not_cached() {
        let cache = cache_with(10);
        let result: Result<QueryOutcome<u32>, _> = cache
            .execute_query(Some("bad"), QueryOptions::default(), || async {
                Err(QueryError::backend("relation does not exist", "42P01"))
            })
            .await;

        assert_eq!(result.unwrap_err(), QueryError::backend("relation does not exist", "42P01"));
        assert!(!cache.contains("bad"));
        let metrics = cache.metrics_snapshot();
        assert_eq!(metrics.len(), 1);
        assert!(!metrics[0].cached);
    }

    #[tokio::test]
    async fn test_uncached_and_keyless_never_store() {
        let cache = cache_with(10);
        let calls = Arc::new(AtomicUsize::new(0));
        cache.execute_query(Some("k"), QueryOptions::uncached(), || counted(&calls, 1)).await.unwrap();
        cache.execute_query(None, QueryOptions::default(), || counted(&calls, 1)).await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.metrics_snapshot()[1].query, "anonymous");
    }

    #[tokio::test]
    async fn test_execute_response() {
        let cache = cache_with(10);

        let empty = cache
            .execute_response(Some("none"), QueryOptions::default(), || async {
                QueryResponse::<u32>::empty()
            })
            .await
            .unwrap();
        assert_eq!(empty.data, None);
        assert!(!cache.contains("none"));

        let found = cache
            .execute_response(Some("some"), QueryOptions::default(), || async { QueryResponse::ok(5u32) })
            .await
            .unwrap();
        assert_eq!(found.data, Some(5));
        assert!(cache.contains("some"));

        let failed = cache
            .execute_response(Some("err"), QueryOptions::default(), || async {
                QueryResponse::<u32>::err(QueryError::NotFound("invoice 9".to_string()))
            })
            .await;
        assert_eq!(failed.unwrap_err(), QueryError::NotFound("invoice 9".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dedupe_joins_inflight_fetch() {
        let cache = cache_with(10);
        let calls = Arc::new(AtomicUsize::new(0));
        let opts = QueryOptions::uncached().dedupe();

        let fetch = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, QueryError>(vec![1, 2, 3])
            }
        };

        let (a, b, c) = tokio::join!(
            cache.execute_query(Some("list"), opts, fetch),
            cache.execute_query(Some("list"), opts, fetch),
            cache.execute_query(Some("list"), opts, fetch),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().data, vec![1, 2, 3]);
        assert_eq!(b.unwrap().data, c.unwrap().data);
        assert_eq!(cache.deduper().in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let cache = cache_with(10);
        let result: Result<QueryOutcome<u8>, _> = cache
            .execute_query(
                Some("hang"),
                QueryOptions::default().timeout(Duration::from_millis(500)),
                || std::future::pending(),
            )
            .await;
        assert_eq!(result.unwrap_err(), QueryError::Timeout(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_warning() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cache = QueryCache::new(CacheConfig {
            slow_query_ms: 100,
            ..Default::default()
        })
        .with_warning_handler(Arc::new(move |w: &RuntimeWarning| sink.lock().unwrap().push(w.clone())));

        let result = cache
            .execute_query(Some("slow"), QueryOptions::default(), || async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok::<_, QueryError>(1u8)
            })
            .await;

        assert_eq!(result.unwrap().data, 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], RuntimeWarning::SlowQuery { query, .. } if query == "slow"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_bounded_and_ordered() {
        let cache = cache_with(100);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let queries: Vec<BatchQuery<usize>> = (0..12)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                BatchQuery::new(move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    // Later inputs finish first.
                    tokio::time::sleep(Duration::from_millis(100 - i as u64 * 5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
                .key(format!("q{}", i))
            })
            .collect();

        let results = cache.execute_batch(queries).await;
        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 5);
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap().data).collect();
        assert_eq!(values, (0..12).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_cleanup() {
        let cache = Arc::new(QueryCache::new(CacheConfig {
            cleanup_interval_ms: 1000,
            ..Default::default()
        }));
        cache.insert("short", 1u8, Some(Duration::from_millis(100)));
        cache.insert("long", 2u8, Some(Duration::from_secs(3600)));

        cache.start_periodic_cleanup().unwrap();
        assert!(matches!(
            cache.start_periodic_cleanup(),
            Err(MonitorError::AlreadyRunning(_))
        ));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));

        cache.stop_periodic_cleanup().await.unwrap();
        assert_eq!(
            cache.stop_periodic_cleanup().await,
            Err(MonitorError::NotRunning("cache cleanup"))
        );
    }

    #[tokio::test]
    async fn test_invalidate_and_stats() {
        let cache = cache_with(10);
        cache.insert("invoice:1", 1u8, None);
        cache.insert("invoice:2", 2u8, None);
        cache.insert("afe:1", 3u8, None);
        let _ = cache.lookup::<u8>("afe:1");

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_hits, 1);

        assert_eq!(cache.invalidate_prefix("invoice:"), 2);
        assert!(cache.invalidate("afe:1"));
        assert!(!cache.invalidate("afe:1"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_analytics_from_cache() {
        let cache = cache_with(10);
        let calls = Arc::new(AtomicUsize::new(0));
        cache.execute_query(Some("a"), QueryOptions::default(), || counted(&calls, 1)).await.unwrap();
        cache.execute_query(Some("a"), QueryOptions::default(), || counted(&calls, 1)).await.unwrap();
        cache.record_external_metric(QueryMetric::new("GET /api", Duration::from_millis(5), false));

        let analytics = cache.query_analytics(5);
        assert_eq!(analytics.total_queries, 3);
        assert_eq!(analytics.cache_hits, 1);
    }
}
