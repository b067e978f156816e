// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Vigil runtime.
//!
//! This module provides strongly-typed errors for different parts of the runtime,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.
//!
//! Instrumentation (tracing, logging, metrics) never surfaces these to business
//! code. Only [`QueryError`] is transparent: whatever a wrapped query returns is
//! handed back to the caller unchanged.

use thiserror::Error;

/// Errors produced by (or passed through) query execution.
///
/// `Clone` so that every caller joined on a deduplicated request observes the
/// identical settled value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Backend error: {message}")]
    Backend {
        message: String,
        code: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Query failed: {0}")]
    Failed(String),
}

impl QueryError {
    /// Create a backend error with an error code.
    pub fn backend(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Create a backend error without an error code.
    pub fn backend_message(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            code: None,
        }
    }

    /// Check if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<anyhow::Error> for QueryError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}

/// Errors delivering records to a telemetry sink.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SinkError {
    fn from(err: rusqlite::Error) -> Self {
        Self::WriteFailed(err.to_string())
    }
}

/// Errors from monitor registration and background task lifecycle.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Unknown SLO: {0}")]
    UnknownSlo(String),

    #[error("Invalid SLO target {target} for {name}: must be between 0 and 1 exclusive")]
    InvalidTarget { name: String, target: String },

    #[error("Background task already running: {0}")]
    AlreadyRunning(&'static str),

    #[error("Background task not running: {0}")]
    NotRunning(&'static str),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors from an HTTP transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(0)
        } else if err.is_builder() {
            Self::InvalidUrl(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_backend() {
        let err = QueryError::backend("duplicate key", "23505");
        match err {
            QueryError::Backend { message, code } => {
                assert_eq!(message, "duplicate key");
                assert_eq!(code, Some("23505".to_string()));
            }
            _ => panic!("Expected Backend"),
        }
    }

    #[test]
    fn test_query_error_timeout() {
        assert!(QueryError::Timeout(5000).is_timeout());
        assert!(!QueryError::Failed("boom".to_string()).is_timeout());
    }

    #[test]
    fn test_query_error_from_anyhow() {
        let err: QueryError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err, QueryError::Failed("connection reset".to_string()));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_monitor_error_display() {
        let err = MonitorError::InvalidTarget {
            name: "api".to_string(),
            target: "1.5".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("api"));
        assert!(display.contains("1.5"));
    }
}
