// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vital, component render, and API call timing collection.
//!
//! All recording is synchronous, never fails, and keeps memory bounded:
//! vitals and API calls live in fixed-size rings, components and endpoints
//! in capped per-name aggregates that forget the least recently recorded name.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{QueryCache, QueryMetric};
use crate::config::PerformanceConfig;
use crate::warning::{self, RuntimeWarning, WarningHandler};

use super::histogram::{EndpointStats, EndpointSummary};

/// Number of API calls listed in the summary.
const SLOWEST_API_CALLS: usize = 5;

/// Standard page vitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VitalName {
    /// Largest contentful paint (ms).
    Lcp,
    /// First input delay (ms).
    Fid,
    /// Cumulative layout shift (unitless).
    Cls,
    /// Time to first byte (ms).
    Ttfb,
    /// First contentful paint (ms).
    Fcp,
}

impl VitalName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lcp => "lcp",
            Self::Fid => "fid",
            Self::Cls => "cls",
            Self::Ttfb => "ttfb",
            Self::Fcp => "fcp",
        }
    }

    /// `(good, poor)` boundaries: at or below `good` is good, above `poor` is poor.
    pub fn thresholds(&self) -> (f64, f64) {
        match self {
            Self::Lcp => (2500.0, 4000.0),
            Self::Fid => (100.0, 300.0),
            Self::Cls => (0.1, 0.25),
            Self::Ttfb => (800.0, 1800.0),
            Self::Fcp => (1800.0, 3000.0),
        }
    }

    pub fn rate(&self, value: f64) -> Rating {
        let (good, poor) = self.thresholds();
        if value <= good {
            Rating::Good
        } else if value <= poor {
            Rating::NeedsImprovement
        } else {
            Rating::Poor
        }
    }
}

impl fmt::Display for VitalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Good,
    NeedsImprovement,
    Poor,
}

/// A named measurement. Vitals carry a rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Running render statistics for one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetric {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_ms: Option<f64>,
    pub last_render_ms: f64,
    pub max_render_ms: f64,
    pub update_count: u64,
}

/// One outbound API call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetric {
    pub endpoint: String,
    pub method: String,
    /// HTTP status, absent when the call failed before a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl ApiMetric {
    pub fn new(
        method: impl Into<String>,
        endpoint: impl Into<String>,
        status: Option<u16>,
        duration: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            status,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| (200..400).contains(&s))
    }
}

/// Snapshot returned by [`PerformanceMonitor::get_performance_summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    /// Recent vitals and named metrics, oldest first.
    pub metrics: Vec<PerformanceMetric>,
    /// Components whose slowest render exceeded the frame budget, slowest first.
    pub slow_components: Vec<ComponentMetric>,
    /// Slowest recent API calls, slowest first.
    pub slowest_api_calls: Vec<ApiMetric>,
    /// Per-endpoint latency, ordered by endpoint.
    pub endpoints: Vec<EndpointSummary>,
}

#[derive(Debug, Default)]
struct State {
    metrics: VecDeque<PerformanceMetric>,
    components: Aggregates<ComponentMetric>,
    api_calls: VecDeque<ApiMetric>,
    endpoints: Aggregates<EndpointStats>,
}

/// Per-name aggregates holding at most `cap` names.
#[derive(Debug)]
struct Aggregates<T> {
    entries: HashMap<String, (u64, T)>,
    tick: u64,
}

impl<T> Default for Aggregates<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tick: 0,
        }
    }
}

impl<T> Aggregates<T> {
    /// Aggregate for `name`, created with `init` if absent. Adding a name to a
    /// full map drops the least recently recorded one.
    fn record(&mut self, name: &str, cap: usize, init: impl FnOnce() -> T) -> &mut T {
        self.tick += 1;
        let tick = self.tick;
        if !self.entries.contains_key(name) && self.entries.len() >= cap.max(1) {
            let stalest = self
                .entries
                .iter()
                .min_by_key(|(_, (tick, _))| *tick)
                .map(|(key, _)| key.clone());
            if let Some(key) = stalest {
                self.entries.remove(&key);
            }
        }
        let slot = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| (0, init()));
        slot.0 = tick;
        &mut slot.1
    }

    fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name).map(|(_, value)| value)
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter().map(|(key, (_, value))| (key, value))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Milliseconds as a `Duration`, saturating instead of panicking on
/// negative, NaN, infinite, or oversized input.
fn duration_from_ms(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, cap: usize) {
    if ring.len() >= cap.max(1) {
        ring.pop_front();
    }
    ring.push_back(item);
}

/// Collects performance measurements for one application instance.
pub struct PerformanceMonitor {
    state: Mutex<State>,
    config: PerformanceConfig,
    warnings: Option<WarningHandler>,
    cache: Option<Arc<QueryCache>>,
}

impl PerformanceMonitor {
    /// Create an empty monitor.
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            config,
            warnings: None,
            cache: None,
        }
    }

    /// Forward slow-render, slow-API, and poor-vital warnings to `handler`.
    pub fn with_warning_handler(mut self, handler: WarningHandler) -> Self {
        self.warnings = Some(handler);
        self
    }

    /// Mirror API calls into the cache's query metrics stream.
    pub fn with_query_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Active settings.
    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a page vital and return its rating. Poor ratings raise a warning.
    pub fn record_vital(&self, name: VitalName, value: f64) -> Rating {
        let rating = name.rate(value);
        let metric = PerformanceMetric {
            name: name.as_str().to_string(),
            value,
            rating: Some(rating),
            timestamp: Utc::now(),
            labels: BTreeMap::new(),
        };
        push_bounded(&mut self.state().metrics, metric, self.config.max_metrics);

        if rating == Rating::Poor {
            warning::raise(
                self.warnings.as_ref(),
                RuntimeWarning::PoorVital {
                    name: name.as_str().to_string(),
                    value,
                },
            );
        }
        rating
    }

    /// Record an arbitrary named measurement.
    pub fn record_metric(&self, name: impl Into<String>, value: f64, labels: BTreeMap<String, String>) {
        let metric = PerformanceMetric {
            name: name.into(),
            value,
            rating: None,
            timestamp: Utc::now(),
            labels,
        };
        push_bounded(&mut self.state().metrics, metric, self.config.max_metrics);
    }

    /// Record one render of `name`. Renders over the frame budget raise a warning.
    pub fn record_component_metric(&self, name: &str, render_ms: f64, is_mount: bool) {
        {
            let mut state = self.state();
            let entry = state
                .components
                .record(name, self.config.max_components, || ComponentMetric {
                    name: name.to_string(),
                    mount_ms: None,
                    last_render_ms: 0.0,
                    max_render_ms: 0.0,
                    update_count: 0,
                });
            if is_mount {
                entry.mount_ms = Some(render_ms);
            } else {
                entry.update_count += 1;
            }
            entry.last_render_ms = render_ms;
            entry.max_render_ms = entry.max_render_ms.max(render_ms);
        }

        if render_ms > self.config.render_budget_ms {
            warning::raise(
                self.warnings.as_ref(),
                RuntimeWarning::SlowRender {
                    component: name.to_string(),
                    render_ms,
                },
            );
        }
    }

    /// Aggregate for one component, if it is still retained.
    pub fn component(&self, name: &str) -> Option<ComponentMetric> {
        self.state().components.get(name).cloned()
    }

    /// Number of endpoints with retained latency aggregates.
    pub fn endpoint_count(&self) -> usize {
        self.state().endpoints.len()
    }

    /// Record an API call. Calls slower than the configured limit raise a warning.
    pub fn record_api_metric(&self, metric: ApiMetric) {
        let duration = duration_from_ms(metric.duration_ms);
        let label = format!("{} {}", metric.method, metric.endpoint);
        let slow = metric.duration_ms > self.config.api_slow_ms as f64;

        {
            let mut state = self.state();
            state
                .endpoints
                .record(&label, self.config.max_endpoints, EndpointStats::default)
                .record(duration, metric.is_success());
            push_bounded(&mut state.api_calls, metric.clone(), self.config.max_api_metrics);
        }

        if let Some(cache) = &self.cache {
            cache.record_external_metric(QueryMetric::new(label.clone(), duration, false));
        }

        if slow {
            warning::raise(
                self.warnings.as_ref(),
                RuntimeWarning::SlowApi {
                    endpoint: label,
                    duration_ms: metric.duration_ms,
                },
            );
        }
    }

    /// Recent metrics, slow components, the slowest API calls, and endpoint latency.
    pub fn get_performance_summary(&self) -> PerformanceSummary {
        let state = self.state();

        let mut slow_components: Vec<ComponentMetric> = state
            .components
            .iter()
            .map(|(_, component)| component)
            .filter(|c| c.max_render_ms > self.config.render_budget_ms)
            .cloned()
            .collect();
        slow_components.sort_by(|a, b| b.max_render_ms.total_cmp(&a.max_render_ms));

        let mut slowest_api_calls: Vec<ApiMetric> = state.api_calls.iter().cloned().collect();
        slowest_api_calls.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest_api_calls.truncate(SLOWEST_API_CALLS);

        let mut endpoints: Vec<EndpointSummary> = state
            .endpoints
            .iter()
            .map(|(name, stats)| stats.summary(name))
            .collect();
        endpoints.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));

        PerformanceSummary {
            metrics: state.metrics.iter().cloned().collect(),
            slow_components,
            slowest_api_calls,
            endpoints,
        }
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        *self.state() = State::default();
    }
}

impl fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("linked_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn collecting() -> (WarningHandler, Arc<Mutex<Vec<RuntimeWarning>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: WarningHandler =
            Arc::new(move |w: &RuntimeWarning| sink.lock().unwrap().push(w.clone()));
        (handler, seen)
    }

    #[test]
    fn test_vital_ratings() {
        assert_eq!(VitalName::Lcp.rate(2500.0), Rating::Good);
        assert_eq!(VitalName::Lcp.rate(3000.0), Rating::NeedsImprovement);
        assert_eq!(VitalName::Cls.rate(0.3), Rating::Poor);
        assert_eq!(VitalName::Fid.rate(50.0), Rating::Good);
    }

    #[test]
    fn test_poor_vital_warns() {
        let (handler, seen) = collecting();
        let monitor = PerformanceMonitor::new(PerformanceConfig::default()).with_warning_handler(handler);

        assert_eq!(monitor.record_vital(VitalName::Ttfb, 300.0), Rating::Good);
        assert_eq!(monitor.record_vital(VitalName::Lcp, 5200.0), Rating::Poor);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], RuntimeWarning::PoorVital { name, .. } if name == "lcp"));
        assert_eq!(monitor.get_performance_summary().metrics.len(), 2);
    }

    #[test]
    fn test_component_running_max_and_updates() {
        let (handler, seen) = collecting();
        let monitor = PerformanceMonitor::new(PerformanceConfig::default()).with_warning_handler(handler);

        monitor.record_component_metric("InvoiceTable", 12.0, true);
        monitor.record_component_metric("InvoiceTable", 30.0, false);
        monitor.record_component_metric("InvoiceTable", 8.0, false);
        monitor.record_component_metric("Header", 2.0, true);

        let table = monitor.component("InvoiceTable").unwrap();
        assert_eq!(table.mount_ms, Some(12.0));
        assert_eq!(table.update_count, 2);
        assert_eq!(table.max_render_ms, 30.0);
        assert_eq!(table.last_render_ms, 8.0);

        let summary = monitor.get_performance_summary();
        assert_eq!(summary.slow_components.len(), 1);
        assert_eq!(summary.slow_components[0].name, "InvoiceTable");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_api_ring_bounded_and_slowest_sorted() {
        let config = PerformanceConfig {
            max_api_metrics: 3,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);
        for ms in [100, 900, 50, 400] {
            monitor.record_api_metric(ApiMetric::new("GET", "/invoices", Some(200), Duration::from_millis(ms)));
        }

        let summary = monitor.get_performance_summary();
        let durations: Vec<f64> = summary.slowest_api_calls.iter().map(|c| c.duration_ms).collect();
        assert_eq!(durations, vec![900.0, 400.0, 50.0]);
        assert_eq!(summary.endpoints.len(), 1);
        assert_eq!(summary.endpoints[0].calls, 4);
        assert_eq!(summary.endpoints[0].endpoint, "GET /invoices");
    }

    #[test]
    fn test_slow_api_warns_and_mirrors_into_cache() {
        let (handler, seen) = collecting();
        let cache = Arc::new(QueryCache::new(CacheConfig::default()));
        let monitor = PerformanceMonitor::new(PerformanceConfig::default())
            .with_warning_handler(handler)
            .with_query_cache(Arc::clone(&cache));

        monitor.record_api_metric(ApiMetric::new("POST", "/afe", None, Duration::from_millis(3500)));

        assert!(matches!(&seen.lock().unwrap()[0], RuntimeWarning::SlowApi { endpoint, .. } if endpoint == "POST /afe"));
        let mirrored = cache.metrics_snapshot();
        assert_eq!(mirrored.len(), 1);
        assert_eq!(mirrored[0].query, "POST /afe");
        assert_eq!(monitor.get_performance_summary().endpoints[0].failures, 1);
    }

    #[test]
    fn test_generic_metrics_bounded() {
        let config = PerformanceConfig {
            max_metrics: 2,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);
        for i in 0..4 {
            monitor.record_metric(format!("m{}", i), i as f64, BTreeMap::new());
        }
        let names: Vec<_> = monitor
            .get_performance_summary()
            .metrics
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["m2", "m3"]);

        monitor.clear();
        assert!(monitor.get_performance_summary().metrics.is_empty());
    }

    #[test]
    fn test_endpoint_aggregates_capped_dropping_stalest() {
        let config = PerformanceConfig {
            max_endpoints: 3,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);
        let call = |path: &str| ApiMetric::new("GET", path, Some(200), Duration::from_millis(20));

        monitor.record_api_metric(call("/invoices"));
        for i in 0..1_000 {
            monitor.record_api_metric(call(&format!("/invoices/{}", i)));
            // Keep the list endpoint fresh so it survives eviction.
            monitor.record_api_metric(call("/invoices"));
        }

        assert_eq!(monitor.endpoint_count(), 3);
        let names: Vec<String> = monitor
            .get_performance_summary()
            .endpoints
            .into_iter()
            .map(|e| e.endpoint)
            .collect();
        assert_eq!(names, vec!["GET /invoices", "GET /invoices/998", "GET /invoices/999"]);
    }

    #[test]
    fn test_components_capped() {
        let config = PerformanceConfig {
            max_components: 2,
            ..Default::default()
        };
        let monitor = PerformanceMonitor::new(config);
        for name in ["A", "B", "A", "C"] {
            monitor.record_component_metric(name, 1.0, false);
        }
        assert!(monitor.component("A").is_some());
        assert!(monitor.component("B").is_none());
        assert!(monitor.component("C").is_some());
    }

    #[test]
    fn test_api_metric_with_unrepresentable_duration_does_not_panic() {
        let monitor = PerformanceMonitor::new(PerformanceConfig::default());
        for ms in [f64::INFINITY, f64::NAN, -5.0, 1e300] {
            let mut metric = ApiMetric::new("GET", "/afe", Some(200), Duration::ZERO);
            metric.duration_ms = ms;
            monitor.record_api_metric(metric);
        }

        let summary = monitor.get_performance_summary();
        assert_eq!(summary.endpoints[0].calls, 4);
        assert_eq!(summary.slowest_api_calls.len(), 4);
        assert_eq!(duration_from_ms(f64::INFINITY), Duration::MAX);
        assert_eq!(duration_from_ms(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_ms(-1.0), Duration::ZERO);
    }
}
