// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Non-blocking performance warnings forwarded to the application's
//! notification layer.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// A threshold breach noticed while recording a measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeWarning {
    SlowQuery { query: String, duration_ms: f64 },
    SlowApi { endpoint: String, duration_ms: f64 },
    SlowRender { component: String, render_ms: f64 },
    PoorVital { name: String, value: f64 },
}

impl fmt::Display for RuntimeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SlowQuery { query, duration_ms } => {
                write!(f, "Slow query {} took {:.0}ms", query, duration_ms)
            }
            Self::SlowApi { endpoint, duration_ms } => {
                write!(f, "Slow API call {} took {:.0}ms", endpoint, duration_ms)
            }
            Self::SlowRender { component, render_ms } => {
                write!(f, "Slow render of {} took {:.1}ms", component, render_ms)
            }
            Self::PoorVital { name, value } => write!(f, "Poor {} score: {}", name, value),
        }
    }
}

/// Callback receiving warnings. Must return quickly.
pub type WarningHandler = Arc<dyn Fn(&RuntimeWarning) + Send + Sync>;

/// Log a warning and hand it to the handler, if any.
pub(crate) fn raise(handler: Option<&WarningHandler>, warning: RuntimeWarning) {
    tracing::warn!(warning = %warning, "Performance threshold exceeded");
    if let Some(handler) = handler {
        handler(&warning);
    }
}
