// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Service level objectives and multi-window burn-rate alerting.

mod burn_rate;
mod monitor;

pub use burn_rate::{budget_remaining, burn_rate, evaluate_windows, BurnRateWindow, Severity};
pub use monitor::{
    SloBudget, SloDefinition, SloMetrics, SloMonitor, SloStatus, SloViolation, ViolationType,
};
