// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Query metrics ring buffer and analytics.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded query execution (or cache hit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetric {
    /// Cache key or caller-supplied query label.
    pub query: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
}

impl QueryMetric {
    pub fn new(query: impl Into<String>, duration: Duration, cached: bool) -> Self {
        Self {
            query: query.into(),
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            cached,
            row_count: None,
        }
    }

    pub fn with_row_count(mut self, rows: usize) -> Self {
        self.row_count = Some(rows);
        self
    }
}

/// Aggregates over the metrics currently in the ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalytics {
    pub total_queries: usize,
    pub cache_hits: usize,
    /// Fraction in 0.0..=1.0.
    pub cache_hit_rate: f64,
    /// Mean duration of queries that actually ran (cache hits excluded).
    pub average_duration_ms: f64,
    pub slow_queries: usize,
    /// Slowest executed queries, slowest first.
    pub slowest: Vec<QueryMetric>,
}

/// Fixed-capacity ring of query metrics; the oldest entry is dropped on overflow.
#[derive(Debug, Clone)]
pub struct MetricsRing {
    metrics: VecDeque<QueryMetric>,
    capacity: usize,
}

impl MetricsRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            metrics: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, metric: QueryMetric) {
        if self.metrics.len() == self.capacity {
            self.metrics.pop_front();
        }
        self.metrics.push_back(metric);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryMetric> {
        self.metrics.iter()
    }

    pub fn clear(&mut self) {
        self.metrics.clear();
    }

    /// Compute analytics; `top_n` bounds the slowest list.
    pub fn analytics(&self, top_n: usize, slow_threshold: Duration) -> QueryAnalytics {
        let total = self.metrics.len();
        if total == 0 {
            return QueryAnalytics::default();
        }

        let hits = self.metrics.iter().filter(|m| m.cached).count();
        let executed: Vec<&QueryMetric> = self.metrics.iter().filter(|m| !m.cached).collect();
        let average = if executed.is_empty() {
            0.0
        } else {
            executed.iter().map(|m| m.duration_ms).sum::<f64>() / executed.len() as f64
        };

        let threshold_ms = slow_threshold.as_secs_f64() * 1000.0;
        let slow = executed.iter().filter(|m| m.duration_ms > threshold_ms).count();

        let mut slowest: Vec<QueryMetric> = executed.into_iter().cloned().collect();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest.truncate(top_n);

        QueryAnalytics {
            total_queries: total,
            cache_hits: hits,
            cache_hit_rate: hits as f64 / total as f64,
            average_duration_ms: average,
            slow_queries: slow,
            slowest,
        }
    }
}
