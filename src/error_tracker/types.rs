// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracked error records.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::telemetry::LogLevel;

/// Severity of a captured error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    Fatal,
    #[default]
    Error,
    Warning,
    Info,
    Debug,
}

impl ErrorLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Level used when echoing the error through the structured logger.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Fatal | Self::Error => LogLevel::Error,
            Self::Warning => LogLevel::Warn,
            Self::Info => LogLevel::Info,
            Self::Debug => LogLevel::Debug,
        }
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and for whom an error happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill fields left unset here from `defaults`.
    pub(crate) fn inherit(mut self, defaults: &ErrorContext) -> Self {
        if self.user_id.is_none() {
            self.user_id = defaults.user_id.clone();
        }
        if self.route.is_none() {
            self.route = defaults.route.clone();
        }
        if self.component.is_none() {
            self.component = defaults.component.clone();
        }
        if self.action.is_none() {
            self.action = defaults.action.clone();
        }
        if self.trace_id.is_none() {
            self.trace_id = defaults.trace_id.clone();
        }
        for (k, v) in &defaults.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self
    }
}

/// A user or system action recorded ahead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub level: ErrorLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Breadcrumb {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category: category.into(),
            message: message.into(),
            level: ErrorLevel::Info,
            data: None,
        }
    }

    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A captured error waiting to be flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedError {
    pub id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub level: ErrorLevel,
    pub context: ErrorContext,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub breadcrumbs: Vec<Breadcrumb>,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
}
