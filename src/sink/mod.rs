// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry sinks: where logs, tracked errors, and SLO violations end up.
//!
//! A sink accepts a batch and reports success or failure. Callers own retry.

#[cfg(feature = "sqlite")]
mod sqlite;

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::error_tracker::TrackedError;
use crate::slo::SloViolation;
use crate::telemetry::LogEntry;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSink;

/// Append-only destination for telemetry batches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Sink name for diagnostics.
    fn name(&self) -> &str;

    async fn write_logs(&self, batch: &[LogEntry]) -> Result<(), SinkError>;

    async fn write_errors(&self, batch: &[TrackedError]) -> Result<(), SinkError>;

    async fn write_violations(&self, batch: &[SloViolation]) -> Result<(), SinkError>;
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn TelemetrySink>;

/// Build the sink described by configuration.
pub fn create_sink(config: &SinkConfig) -> Result<SharedSink, SinkError> {
    match config {
        SinkConfig::Memory => Ok(Arc::new(MemorySink::new())),
        SinkConfig::Stdout => Ok(Arc::new(StdoutSink)),
        #[cfg(feature = "sqlite")]
        SinkConfig::Sqlite { path } => Ok(Arc::new(SqliteSink::open(path)?)),
        #[cfg(not(feature = "sqlite"))]
        SinkConfig::Sqlite { .. } => Err(SinkError::Unavailable(
            "built without the `sqlite` feature".to_string(),
        )),
    }
}

/// In-memory sink. Inspectable, and can be told to fail for retry testing.
#[derive(Debug, Default)]
pub struct MemorySink {
    logs: Mutex<Vec<LogEntry>>,
    errors: Mutex<Vec<TrackedError>>,
    violations: Mutex<Vec<SloViolation>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemorySink {
    /// Empty sink that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of write calls received, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Logs delivered so far.
    pub fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Tracked errors delivered so far.
    pub fn errors(&self) -> Vec<TrackedError> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// SLO violations delivered so far.
    pub fn violations(&self) -> Vec<SloViolation> {
        self.violations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn append<T: Clone>(&self, store: &Mutex<Vec<T>>, batch: &[T]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable("memory sink set to fail".to_string()));
        }
        store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(batch);
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write_logs(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
        self.append(&self.logs, batch)
    }

    async fn write_errors(&self, batch: &[TrackedError]) -> Result<(), SinkError> {
        self.append(&self.errors, batch)
    }

    async fn write_violations(&self, batch: &[SloViolation]) -> Result<(), SinkError> {
        self.append(&self.violations, batch)
    }
}

/// Writes each record as a tagged JSON line on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl StdoutSink {
    fn write_all<T: Serialize>(kind: &str, batch: &[T]) -> Result<(), SinkError> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in batch {
            let line = serde_json::to_string(&serde_json::json!({ "kind": kind, "record": record }))?;
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn write_logs(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
        Self::write_all("log", batch)
    }

    async fn write_errors(&self, batch: &[TrackedError]) -> Result<(), SinkError> {
        Self::write_all("error", batch)
    }

    async fn write_violations(&self, batch: &[SloViolation]) -> Result<(), SinkError> {
        Self::write_all("slo_violation", batch)
    }
}
