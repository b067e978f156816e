// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.
//!
//! Every section has full defaults, so an empty file (or no file) is a valid
//! configuration. Partial files are merged field by field over the defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::slo::{BurnRateWindow, Severity, SloDefinition};

/// Root configuration for the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VigilConfig {
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub errors: ErrorTrackerConfig,
    pub slo: SloConfig,
    pub performance: PerformanceConfig,
    pub sink: SinkConfig,
}

impl VigilConfig {
    /// Reject configurations the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_size == 0 {
            return Err(ConfigError::invalid("cache.maxSize", "must be at least 1"));
        }
        if self.cache.batch_concurrency == 0 {
            return Err(ConfigError::invalid("cache.batchConcurrency", "must be at least 1"));
        }
        if self.cache.metrics_capacity == 0 {
            return Err(ConfigError::invalid("cache.metricsCapacity", "must be at least 1"));
        }
        if self.cache.cleanup_interval_ms == 0 {
            return Err(ConfigError::invalid("cache.cleanupIntervalMs", "must be at least 1"));
        }
        if self.errors.flush_interval_ms == 0 {
            return Err(ConfigError::invalid("errors.flushIntervalMs", "must be at least 1"));
        }
        if self.errors.max_queue_size == 0 {
            return Err(ConfigError::invalid("errors.maxQueueSize", "must be at least 1"));
        }
        for objective in &self.slo.objectives {
            if !(objective.target > 0.0 && objective.target < 1.0) {
                return Err(ConfigError::invalid(
                    format!("slo.objectives.{}.target", objective.name),
                    format!("{} is not between 0 and 1 exclusive", objective.target),
                ));
            }
        }
        for window in &self.slo.windows {
            if !(window.threshold > 0.0) {
                return Err(ConfigError::invalid(
                    format!("slo.windows.{}.threshold", window.label),
                    "must be positive",
                ));
            }
        }
        Ok(())
    }
}

/// Output format for the `tracing` subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingConfig {
    /// Default level if RUST_LOG is not set.
    pub level: String,
    pub format: LogFormat,
    /// Service label attached to every structured log record.
    pub service: String,
    /// Whether to use ANSI colors in output.
    pub ansi: bool,
    /// Custom filter directive (overrides level).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            service: "vigil".to_string(),
            ansi: true,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Verbose output for development.
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            ..Default::default()
        }
    }

    /// Machine-readable output for production.
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            ansi: false,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Query cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Entries kept before the oldest is evicted.
    pub max_size: usize,
    /// TTL for entries stored without an explicit one.
    pub default_ttl_ms: u64,
    /// Queries slower than this raise a warning.
    pub slow_query_ms: u64,
    /// Query metrics retained for analytics.
    pub metrics_capacity: usize,
    /// Period of the expiry sweep. Must be non-zero.
    pub cleanup_interval_ms: u64,
    /// Queries of one batch run at most this many at a time.
    pub batch_concurrency: usize,
    /// Deadline applied to every fetch unless overridden per call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout_ms: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            default_ttl_ms: 5 * 60 * 1000,
            slow_query_ms: 1000,
            metrics_capacity: 500,
            cleanup_interval_ms: 60 * 1000,
            batch_concurrency: 5,
            query_timeout_ms: None,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Error tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorTrackerConfig {
    /// Captures since the last flush that trigger an immediate one.
    pub max_queue_size: usize,
    /// Period of the background flush. Must be non-zero.
    pub flush_interval_ms: u64,
    /// Breadcrumbs kept, oldest dropped first.
    pub max_breadcrumbs: usize,
    /// Bound on records retained for retry while the sink is failing.
    pub max_pending: usize,
}

impl Default for ErrorTrackerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            flush_interval_ms: 30 * 1000,
            max_breadcrumbs: 20,
            max_pending: 1000,
        }
    }
}

impl ErrorTrackerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// SLO objectives and alerting windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SloConfig {
    pub objectives: Vec<SloDefinition>,
    pub windows: Vec<BurnRateWindow>,
}

impl Default for SloConfig {
    fn default() -> Self {
        Self {
            objectives: Vec::new(),
            windows: default_windows(),
        }
    }
}

/// Multi-window burn-rate thresholds; shorter windows alert on steeper burns.
pub fn default_windows() -> Vec<BurnRateWindow> {
    vec![
        BurnRateWindow::new("1h", 14.4, Severity::Critical),
        BurnRateWindow::new("6h", 6.0, Severity::Warning),
        BurnRateWindow::new("24h", 3.0, Severity::Info),
        BurnRateWindow::new("72h", 1.0, Severity::Info),
    ]
}

/// Performance monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConfig {
    /// API calls slower than this raise a warning.
    pub api_slow_ms: u64,
    /// Frame budget; slower renders raise a warning.
    pub render_budget_ms: f64,
    /// Capacity of the recent API call ring.
    pub max_api_metrics: usize,
    /// Capacity of the vitals and named metric ring.
    pub max_metrics: usize,
    /// Distinct endpoints with latency aggregates; the stalest is dropped past this.
    pub max_endpoints: usize,
    /// Distinct components tracked; the stalest is dropped past this.
    pub max_components: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            api_slow_ms: 3000,
            render_budget_ms: 16.0,
            max_api_metrics: 100,
            max_metrics: 100,
            max_endpoints: 100,
            max_components: 200,
        }
    }
}

/// Where telemetry batches are persisted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    #[default]
    Memory,
    Stdout,
    Sqlite { path: PathBuf },
}
