// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fixed-bucket latency histograms and per-endpoint aggregates.

use std::time::Duration;

use serde::Serialize;

/// Default bucket upper bounds in milliseconds.
pub const DEFAULT_BUCKETS_MS: &[u64] = &[10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10_000];

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Latency histogram with fixed millisecond buckets plus an overflow bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bounds_ms: Vec<u64>,
    counts: Vec<u64>,
}

impl Histogram {
    /// Create a histogram with custom upper bounds, which must be ascending.
    pub fn with_bounds(bounds_ms: Vec<u64>) -> Self {
        let counts = vec![0; bounds_ms.len() + 1];
        Self { bounds_ms, counts }
    }

    /// Count one observation in the first bucket whose bound it does not exceed.
    pub fn record(&mut self, duration: Duration) {
        let ms = whole_millis(duration);
        let idx = self
            .bounds_ms
            .iter()
            .position(|&b| ms <= b)
            .unwrap_or(self.bounds_ms.len());
        self.counts[idx] += 1;
    }

    /// Per-bucket counts; the last entry is the overflow bucket.
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Bucket upper bounds in milliseconds.
    pub fn bounds_ms(&self) -> &[u64] {
        &self.bounds_ms
    }

    /// Number of recorded observations.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Upper bound of the bucket holding the `p`th percentile.
    ///
    /// The overflow bucket reports ten times the largest bound.
    pub fn percentile(&self, p: f64) -> Duration {
        let total = self.total();
        if total == 0 {
            return Duration::ZERO;
        }

        let target = ((total as f64 * p / 100.0).ceil() as u64).max(1);
        let mut cumulative = 0u64;

        for (i, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let ms = match self.bounds_ms.get(i) {
                    Some(&bound) => bound,
                    None => self.bounds_ms.last().copied().unwrap_or(0).saturating_mul(10),
                };
                return Duration::from_millis(ms);
            }
        }

        Duration::ZERO
    }

    pub fn p50(&self) -> Duration {
        self.percentile(50.0)
    }

    pub fn p90(&self) -> Duration {
        self.percentile(90.0)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(99.0)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_bounds(DEFAULT_BUCKETS_MS.to_vec())
    }
}

/// Aggregate latency for one endpoint.
#[derive(Debug, Clone, Default)]
pub struct EndpointStats {
    /// Calls recorded for this endpoint.
    pub calls: u64,
    /// Calls that returned a non-success status or failed outright.
    pub failures: u64,
    /// Sum of call durations, saturating at `Duration::MAX`.
    pub total: Duration,
    /// Slowest call seen.
    pub max: Duration,
    pub histogram: Histogram,
}

impl EndpointStats {
    /// Fold one call into the aggregate.
    pub fn record(&mut self, duration: Duration, success: bool) {
        self.calls += 1;
        if !success {
            self.failures += 1;
        }
        self.total = self.total.saturating_add(duration);
        self.max = self.max.max(duration);
        self.histogram.record(duration);
    }

    /// Mean call duration.
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(self.total.as_secs_f64() / self.calls as f64)
                .unwrap_or(self.total)
        }
    }

    /// Snapshot labelled with `endpoint`.
    pub fn summary(&self, endpoint: &str) -> EndpointSummary {
        EndpointSummary {
            endpoint: endpoint.to_string(),
            calls: self.calls,
            failures: self.failures,
            average_ms: self.average().as_secs_f64() * 1000.0,
            max_ms: self.max.as_secs_f64() * 1000.0,
            p50_ms: whole_millis(self.histogram.p50()),
            p90_ms: whole_millis(self.histogram.p90()),
            p99_ms: whole_millis(self.histogram.p99()),
        }
    }
}

/// Serializable view of [`EndpointStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub endpoint: String,
    pub calls: u64,
    pub failures: u64,
    pub average_ms: f64,
    pub max_ms: f64,
    pub p50_ms: u64,
    pub p90_ms: u64,
    pub p99_ms: u64,
}
