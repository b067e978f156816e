// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! SQLite-backed telemetry sink.
//!
//! Each batch is inserted inside one transaction on a blocking thread, so a
//! batch lands entirely or not at all.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::SinkError;
use crate::error_tracker::TrackedError;
use crate::slo::SloViolation;
use crate::telemetry::LogEntry;

use super::TelemetrySink;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        trace_id TEXT NOT NULL,
        span_id TEXT NOT NULL,
        parent_span_id TEXT,
        labels TEXT,
        data TEXT
    );

    CREATE TABLE IF NOT EXISTS error_logs (
        id TEXT PRIMARY KEY,
        timestamp TEXT NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL,
        stack TEXT,
        fingerprint TEXT NOT NULL,
        context TEXT NOT NULL,
        breadcrumbs TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS slo_violations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        detected_at TEXT NOT NULL,
        slo_name TEXT NOT NULL,
        violation_type TEXT NOT NULL,
        severity TEXT NOT NULL,
        burn_rate REAL NOT NULL,
        error_budget_consumed REAL NOT NULL,
        window_duration TEXT NOT NULL,
        details TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_logs_trace_id ON logs(trace_id);
    CREATE INDEX IF NOT EXISTS idx_error_logs_fingerprint ON error_logs(fingerprint);
    CREATE INDEX IF NOT EXISTS idx_slo_violations_name ON slo_violations(slo_name);
"#;

/// Telemetry sink writing to a local SQLite database.
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteSink {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Self::init(conn, path)
    }

    /// In-memory database, mostly for tests.
    pub fn in_memory() -> Result<Self, SinkError> {
        Self::init(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self, SinkError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row count of one of the sink's tables.
    pub fn count(&self, table: &str) -> Result<u64, SinkError> {
        if !matches!(table, "logs" | "error_logs" | "slo_violations") {
            return Err(SinkError::WriteFailed(format!("unknown table: {}", table)));
        }
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Run `insert` for every row inside one transaction, off the async runtime.
    async fn insert_batch<R, F>(&self, rows: Vec<R>, insert: F) -> Result<(), SinkError>
    where
        R: Send + 'static,
        F: Fn(&rusqlite::Transaction<'_>, &R) -> rusqlite::Result<usize> + Send + 'static,
    {
        if rows.is_empty() {
            return Ok(());
        }
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<(), SinkError> {
            let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = conn.transaction()?;
            for row in &rows {
                insert(&tx, row)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| SinkError::WriteFailed(format!("insert task failed: {}", e)))?
    }
}

struct LogRow {
    timestamp: String,
    level: &'static str,
    message: String,
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    labels: Option<String>,
    data: Option<String>,
}

struct ErrorRow {
    id: String,
    timestamp: String,
    level: &'static str,
    message: String,
    stack: Option<String>,
    fingerprint: String,
    context: String,
    breadcrumbs: String,
}

struct ViolationRow {
    detected_at: String,
    slo_name: String,
    violation_type: &'static str,
    severity: &'static str,
    burn_rate: f64,
    error_budget_consumed: f64,
    window_duration: String,
    details: String,
}

#[async_trait]
impl TelemetrySink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn write_logs(&self, batch: &[LogEntry]) -> Result<(), SinkError> {
        let rows = batch
            .iter()
            .map(|e| {
                Ok(LogRow {
                    timestamp: e.timestamp.to_rfc3339(),
                    level: level_str(e.level),
                    message: e.message.clone(),
                    trace_id: e.trace_context.trace_id.to_string(),
                    span_id: e.trace_context.span_id.to_string(),
                    parent_span_id: e.trace_context.parent_span_id.map(|p| p.to_string()),
                    labels: if e.labels.is_empty() {
                        None
                    } else {
                        Some(serde_json::to_string(&e.labels)?)
                    },
                    data: e.data.as_ref().map(|d| d.to_string()),
                })
            })
            .collect::<Result<Vec<_>, SinkError>>()?;

        self.insert_batch(rows, |tx, r| {
            tx.execute(
                "INSERT INTO logs (timestamp, level, message, trace_id, span_id, parent_span_id, labels, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![r.timestamp, r.level, r.message, r.trace_id, r.span_id, r.parent_span_id, r.labels, r.data],
            )
        })
        .await
    }

    async fn write_errors(&self, batch: &[TrackedError]) -> Result<(), SinkError> {
        let rows = batch
            .iter()
            .map(|e| {
                Ok(ErrorRow {
                    id: e.id.clone(),
                    timestamp: e.timestamp.to_rfc3339(),
                    level: e.level.as_str(),
                    message: e.message.clone(),
                    stack: e.stack.clone(),
                    fingerprint: e.fingerprint.clone(),
                    context: serde_json::to_string(&e.context)?,
                    breadcrumbs: serde_json::to_string(&e.breadcrumbs)?,
                })
            })
            .collect::<Result<Vec<_>, SinkError>>()?;

        self.insert_batch(rows, |tx, r| {
            tx.execute(
                "INSERT OR REPLACE INTO error_logs (id, timestamp, level, message, stack, fingerprint, context, breadcrumbs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![r.id, r.timestamp, r.level, r.message, r.stack, r.fingerprint, r.context, r.breadcrumbs],
            )
        })
        .await
    }

    async fn write_violations(&self, batch: &[SloViolation]) -> Result<(), SinkError> {
        let rows = batch
            .iter()
            .map(|v| {
                Ok(ViolationRow {
                    detected_at: v.detected_at.to_rfc3339(),
                    slo_name: v.slo_name.clone(),
                    violation_type: v.violation_type.as_str(),
                    severity: v.severity.as_str(),
                    burn_rate: v.burn_rate,
                    error_budget_consumed: v.error_budget_consumed,
                    window_duration: v.window_duration.clone(),
                    details: serde_json::to_string(&v.details)?,
                })
            })
            .collect::<Result<Vec<_>, SinkError>>()?;

        self.insert_batch(rows, |tx, r| {
            tx.execute(
                "INSERT INTO slo_violations (detected_at, slo_name, violation_type, severity, burn_rate, error_budget_consumed, window_duration, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    r.detected_at,
                    r.slo_name,
                    r.violation_type,
                    r.severity,
                    r.burn_rate,
                    r.error_budget_consumed,
                    r.window_duration,
                    r.details
                ],
            )
        })
        .await
    }
}

fn level_str(level: crate::telemetry::LogLevel) -> &'static str {
    use crate::telemetry::LogLevel;
    match level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}
