// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-objective success/error counters with multi-window burn-rate alerting.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{default_windows, SloConfig};
use crate::error::MonitorError;
use crate::telemetry::TelemetryWriter;

use super::burn_rate::{budget_remaining, burn_rate, evaluate_windows, BurnRateWindow, Severity};

fn default_window() -> String {
    "30d".to_string()
}

/// A service level objective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SloDefinition {
    pub name: String,
    /// Target success fraction, strictly between 0 and 1.
    pub target: f64,
    /// Compliance period label, e.g. "30d".
    #[serde(default = "default_window")]
    pub window: String,
}

impl SloDefinition {
    pub fn new(name: impl Into<String>, target: f64, window: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target,
            window: window.into(),
        }
    }

    /// Tolerated failure fraction, `1 - target`.
    pub fn error_budget(&self) -> f64 {
        1.0 - self.target
    }

    fn check(&self) -> Result<(), MonitorError> {
        if self.target.is_finite() && self.target > 0.0 && self.target < 1.0 {
            Ok(())
        } else {
            Err(MonitorError::InvalidTarget {
                name: self.name.clone(),
                target: self.target.to_string(),
            })
        }
    }
}

/// Counters and derived rates for one objective.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SloMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub burn_rate: f64,
    /// Percentage of the error budget left.
    pub budget_remaining: f64,
}

impl Default for SloMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            error_count: 0,
            success_rate: 1.0,
            error_rate: 0.0,
            burn_rate: 0.0,
            budget_remaining: 100.0,
        }
    }
}

impl SloMetrics {
    fn recompute(&mut self, error_budget: f64) {
        if self.total_requests == 0 {
            *self = Self::default();
            return;
        }
        let total = self.total_requests as f64;
        self.success_rate = self.successful_requests as f64 / total;
        self.error_rate = self.error_count as f64 / total;
        self.burn_rate = burn_rate(self.error_rate, error_budget);
        self.budget_remaining = budget_remaining(self.burn_rate);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    BurnRate,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BurnRate => "burn_rate",
        }
    }
}

/// One exceeded burn-rate window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SloViolation {
    pub slo_name: String,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub burn_rate: f64,
    /// Percentage of the error budget spent.
    pub error_budget_consumed: f64,
    /// Label of the window that fired.
    pub window_duration: String,
    pub details: BTreeMap<String, Value>,
    pub detected_at: DateTime<Utc>,
}

/// Coarse budget health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SloStatus {
    /// More than half the budget left.
    Healthy,
    /// Some budget left.
    AtRisk,
    /// No budget left.
    Exhausted,
}

impl SloStatus {
    pub fn from_budget_remaining(remaining: f64) -> Self {
        if remaining > 50.0 {
            Self::Healthy
        } else if remaining > 0.0 {
            Self::AtRisk
        } else {
            Self::Exhausted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::AtRisk => "at_risk",
            Self::Exhausted => "exhausted",
        }
    }
}

/// Row of [`SloMonitor::budget_report`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SloBudget {
    pub name: String,
    pub target: f64,
    pub burn_rate: f64,
    pub budget_remaining: f64,
    pub status: SloStatus,
}

#[derive(Debug)]
struct SloState {
    definition: SloDefinition,
    metrics: SloMetrics,
}

enum Outcome {
    Success,
    Error,
}

/// Tracks registered objectives and raises burn-rate violations.
///
/// Burn rate is derived from cumulative counters since registration (or the
/// last reset). Every window is evaluated against that one figure after each
/// update.
#[derive(Debug)]
pub struct SloMonitor {
    slos: RwLock<HashMap<String, SloState>>,
    windows: Vec<BurnRateWindow>,
    writer: Option<TelemetryWriter>,
}

impl Default for SloMonitor {
    fn default() -> Self {
        Self::new(default_windows())
    }
}

impl SloMonitor {
    pub fn new(windows: Vec<BurnRateWindow>) -> Self {
        Self {
            slos: RwLock::new(HashMap::new()),
            windows,
            writer: None,
        }
    }

    /// Build a monitor with the configured windows and objectives.
    pub fn from_config(config: &SloConfig) -> Result<Self, MonitorError> {
        let monitor = Self::new(config.windows.clone());
        for objective in &config.objectives {
            monitor.register_slo(objective.clone())?;
        }
        Ok(monitor)
    }

    /// Forward violations to the telemetry writer.
    pub fn with_writer(mut self, writer: TelemetryWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn windows(&self) -> &[BurnRateWindow] {
        &self.windows
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SloState>> {
        self.slos.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SloState>> {
        self.slos.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an objective with zeroed metrics. Re-registering a name
    /// replaces its definition and resets its counters.
    pub fn register_slo(&self, definition: SloDefinition) -> Result<(), MonitorError> {
        definition.check()?;
        tracing::debug!(
            slo = %definition.name,
            target = definition.target,
            window = %definition.window,
            "Registered SLO"
        );
        self.write().insert(
            definition.name.clone(),
            SloState {
                definition,
                metrics: SloMetrics::default(),
            },
        );
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Option<SloDefinition> {
        self.read().get(name).map(|s| s.definition.clone())
    }

    pub fn record_success(&self, name: &str) -> Result<Vec<SloViolation>, MonitorError> {
        self.record(name, Outcome::Success)
    }

    pub fn record_error(&self, name: &str) -> Result<Vec<SloViolation>, MonitorError> {
        self.record(name, Outcome::Error)
    }

    fn record(&self, name: &str, outcome: Outcome) -> Result<Vec<SloViolation>, MonitorError> {
        let (definition, metrics) = {
            let mut slos = self.write();
            let state = slos
                .get_mut(name)
                .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;

            state.metrics.total_requests += 1;
            match outcome {
                Outcome::Success => state.metrics.successful_requests += 1,
                Outcome::Error => state.metrics.error_count += 1,
            }
            state.metrics.recompute(state.definition.error_budget());
            (state.definition.clone(), state.metrics.clone())
        };

        let violations = self.check_burn_rate(&definition, &metrics);
        for violation in &violations {
            tracing::warn!(
                slo = %violation.slo_name,
                window = %violation.window_duration,
                severity = %violation.severity,
                burn_rate = violation.burn_rate,
                "SLO burn rate threshold exceeded"
            );
            if let Some(writer) = &self.writer {
                writer.write_violation(violation.clone());
            }
        }
        Ok(violations)
    }

    fn check_burn_rate(&self, definition: &SloDefinition, metrics: &SloMetrics) -> Vec<SloViolation> {
        let detected_at = Utc::now();
        evaluate_windows(metrics.burn_rate, &self.windows)
            .into_iter()
            .map(|window| {
                let details = BTreeMap::from([
                    ("target".to_string(), json!(definition.target)),
                    ("threshold".to_string(), json!(window.threshold)),
                    ("errorRate".to_string(), json!(metrics.error_rate)),
                    ("totalRequests".to_string(), json!(metrics.total_requests)),
                    ("errorCount".to_string(), json!(metrics.error_count)),
                    ("sloWindow".to_string(), json!(definition.window)),
                ]);
                SloViolation {
                    slo_name: definition.name.clone(),
                    violation_type: ViolationType::BurnRate,
                    severity: window.severity,
                    burn_rate: metrics.burn_rate,
                    error_budget_consumed: 100.0 - metrics.budget_remaining,
                    window_duration: window.label.clone(),
                    details,
                    detected_at,
                }
            })
            .collect()
    }

    pub fn get_metrics(&self, name: &str) -> Option<SloMetrics> {
        self.read().get(name).map(|s| s.metrics.clone())
    }

    /// Snapshot of every objective's metrics, ordered by name.
    pub fn get_all_metrics(&self) -> BTreeMap<String, SloMetrics> {
        self.read()
            .iter()
            .map(|(name, s)| (name.clone(), s.metrics.clone()))
            .collect()
    }

    /// Zero the counters of `name` without unregistering it.
    pub fn reset_metrics(&self, name: &str) -> Result<(), MonitorError> {
        let mut slos = self.write();
        let state = slos
            .get_mut(name)
            .ok_or_else(|| MonitorError::UnknownSlo(name.to_string()))?;
        state.metrics = SloMetrics::default();
        Ok(())
    }

    /// Await `fut` and count its `Result` against `name`.
    ///
    /// The result is returned unchanged. An unknown objective is logged and
    /// otherwise ignored.
    pub async fn observe<T, E, Fut>(&self, name: &str, fut: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let result = fut.await;
        let recorded = match &result {
            Ok(_) => self.record_success(name),
            Err(_) => self.record_error(name),
        };
        if let Err(e) = recorded {
            tracing::warn!(slo = name, error = %e, "Could not record SLO outcome");
        }
        result
    }

    /// Budget health for every objective, ordered by name.
    pub fn budget_report(&self) -> Vec<SloBudget> {
        let slos = self.read();
        let mut report: Vec<SloBudget> = slos
            .values()
            .map(|s| SloBudget {
                name: s.definition.name.clone(),
                target: s.definition.target,
                burn_rate: s.metrics.burn_rate,
                budget_remaining: s.metrics.budget_remaining,
                status: SloStatus::from_budget_remaining(s.metrics.budget_remaining),
            })
            .collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::telemetry::WriterConfig;
    use std::sync::Arc;

    fn monitor_with(name: &str, target: f64) -> SloMonitor {
        let monitor = SloMonitor::default();
        monitor.register_slo(SloDefinition::new(name, target, "30d")).unwrap();
        monitor
    }

    #[test]
    fn test_register_rejects_bad_targets() {
        let monitor = SloMonitor::default();
        for target in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let err = monitor
                .register_slo(SloDefinition::new("api", target, "30d"))
                .unwrap_err();
            assert!(matches!(err, MonitorError::InvalidTarget { .. }));
        }
        assert!(monitor.get_all_metrics().is_empty());
    }

    #[test]
    fn test_unknown_slo() {
        let monitor = SloMonitor::default();
        assert_eq!(
            monitor.record_success("nope").unwrap_err(),
            MonitorError::UnknownSlo("nope".to_string())
        );
        assert!(monitor.get_metrics("nope").is_none());
        assert!(monitor.reset_metrics("nope").is_err());
    }

    #[test]
    fn test_one_error_per_hundred_fires_only_longest_window() {
        let monitor = monitor_with("invoices", 0.995);
        for _ in 0..100 {
            assert!(monitor.record_success("invoices").unwrap().is_empty());
        }
        let violations = monitor.record_error("invoices").unwrap();

        let metrics = monitor.get_metrics("invoices").unwrap();
        assert_eq!(metrics.total_requests, 101);
        assert!((metrics.error_rate - 0.0099).abs() < 0.0001);
        assert!((metrics.burn_rate - 1.98).abs() < 0.01);
        assert_eq!(metrics.budget_remaining, 0.0);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Info);
        assert_eq!(violations[0].window_duration, "72h");
        assert_eq!(violations[0].violation_type, ViolationType::BurnRate);
        assert_eq!(violations[0].details["totalRequests"], json!(101));
    }

    #[test]
    fn test_steep_burn_fires_every_window() {
        let monitor = monitor_with("auth", 0.99);
        let violations = monitor.record_error("auth").unwrap();
        let severities: Vec<_> = violations.iter().map(|v| v.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::Warning, Severity::Info, Severity::Info]
        );
    }

    #[test]
    fn test_metrics_recomputed() {
        let monitor = monitor_with("api", 0.9);
        for _ in 0..19 {
            monitor.record_success("api").unwrap();
        }
        monitor.record_error("api").unwrap();

        let m = monitor.get_metrics("api").unwrap();
        assert!((m.success_rate - 0.95).abs() < 1e-9);
        assert!((m.error_rate - 0.05).abs() < 1e-9);
        assert!((m.burn_rate - 0.5).abs() < 1e-9);
        assert!((m.budget_remaining - 50.0).abs() < 1e-9);

        let report = monitor.budget_report();
        assert_eq!(report[0].status, SloStatus::AtRisk);
    }

    #[test]
    fn test_reset_keeps_registration() {
        let monitor = monitor_with("api", 0.99);
        monitor.record_error("api").unwrap();
        monitor.reset_metrics("api").unwrap();

        assert_eq!(monitor.get_metrics("api").unwrap(), SloMetrics::default());
        assert!(monitor.definition("api").is_some());
        assert_eq!(monitor.budget_report()[0].status, SloStatus::Healthy);
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(SloStatus::from_budget_remaining(100.0), SloStatus::Healthy);
        assert_eq!(SloStatus::from_budget_remaining(50.0), SloStatus::AtRisk);
        assert_eq!(SloStatus::from_budget_remaining(0.1), SloStatus::AtRisk);
        assert_eq!(SloStatus::from_budget_remaining(0.0), SloStatus::Exhausted);
    }

    #[tokio::test]
    async fn test_observe_counts_results() {
        let monitor = monitor_with("api", 0.5);
        let ok: Result<u8, String> = monitor.observe("api", async { Ok(1) }).await;
        let err: Result<u8, String> = monitor.observe("api", async { Err("down".to_string()) }).await;
        let unknown: Result<u8, String> = monitor.observe("other", async { Ok(2) }).await;

        assert_eq!(ok, Ok(1));
        assert_eq!(err, Err("down".to_string()));
        assert_eq!(unknown, Ok(2));

        let m = monitor.get_metrics("api").unwrap();
        assert_eq!((m.successful_requests, m.error_count), (1, 1));
    }

    #[tokio::test]
    async fn test_violations_reach_sink() {
        let sink = Arc::new(MemorySink::new());
        let (writer, handle) = TelemetryWriter::spawn(sink.clone(), WriterConfig::default());
        let monitor = monitor_with("api", 0.99).with_writer(writer.clone());

        let produced = monitor.record_error("api").unwrap();
        writer.shutdown().await;
        handle.await.unwrap();

        assert_eq!(sink.violations(), produced);
    }

    #[test]
    fn test_from_config() {
        let config = SloConfig {
            objectives: vec![SloDefinition::new("api", 0.999, "30d")],
            ..Default::default()
        };
        let monitor = SloMonitor::from_config(&config).unwrap();
        assert_eq!(monitor.windows().len(), 4);
        assert_eq!(monitor.definition("api").unwrap().error_budget(), 1.0 - 0.999);
    }
}
