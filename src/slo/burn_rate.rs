// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Pure burn-rate arithmetic.
//!
//! Burn rate is the observed error rate divided by the error budget. A burn
//! rate of 1.0 spends the budget exactly over the SLO window; 14.4 spends a
//! 30 day budget in about two days.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Alert severity attached to a burn-rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labelled burn-rate threshold.
///
/// The label names the alerting horizon ("1h", "6h", ...). Every window is
/// checked against the same cumulative burn rate; the label does not select a
/// time-bucketed subset of requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurnRateWindow {
    pub label: String,
    pub threshold: f64,
    pub severity: Severity,
}

impl BurnRateWindow {
    pub fn new(label: impl Into<String>, threshold: f64, severity: Severity) -> Self {
        Self {
            label: label.into(),
            threshold,
            severity,
        }
    }
}

/// `error_rate / error_budget`.
///
/// A zero budget burns infinitely fast on any error and not at all without one.
pub fn burn_rate(error_rate: f64, error_budget: f64) -> f64 {
    if error_budget <= 0.0 {
        return if error_rate > 0.0 { f64::INFINITY } else { 0.0 };
    }
    error_rate / error_budget
}

/// Percentage of the error budget left, clamped to `0.0..=100.0`.
pub fn budget_remaining(burn_rate: f64) -> f64 {
    (100.0 - burn_rate * 100.0).clamp(0.0, 100.0)
}

/// Windows whose threshold is strictly exceeded by `burn_rate`, in input order.
pub fn evaluate_windows(burn_rate: f64, windows: &[BurnRateWindow]) -> Vec<&BurnRateWindow> {
    windows.iter().filter(|w| burn_rate > w.threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_windows;

    #[test]
    fn test_burn_rate() {
        let rate = burn_rate(1.0 / 101.0, 1.0 - 0.995);
        assert!((rate - 1.980).abs() < 0.001);
        assert_eq!(burn_rate(0.0, 0.005), 0.0);
        assert_eq!(burn_rate(0.1, 0.0), f64::INFINITY);
        assert_eq!(burn_rate(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_budget_remaining() {
        assert_eq!(budget_remaining(0.0), 100.0);
        assert!((budget_remaining(0.25) - 75.0).abs() < 1e-9);
        assert_eq!(budget_remaining(3.0), 0.0);
        assert_eq!(budget_remaining(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_evaluate_windows() {
        let windows = default_windows();

        let fired = evaluate_windows(1.98, &windows);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].label, "72h");
        assert_eq!(fired[0].severity, Severity::Info);

        let fired = evaluate_windows(20.0, &windows);
        let labels: Vec<_> = fired.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(labels, vec!["1h", "6h", "24h", "72h"]);

        // Threshold must be exceeded, not met.
        assert!(evaluate_windows(1.0, &windows).is_empty());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert_eq!(Severity::Warning.to_string(), "warning");
    }
}
