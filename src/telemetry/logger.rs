// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Structured logger bound to a [`TraceContext`].
//!
//! Every call emits exactly one [`LogEntry`] through a [`LogTransport`]. Emission
//! is synchronous and infallible from the caller's point of view; transports
//! that talk to slow destinations hand the record off and return immediately.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::{ContextSeed, TraceContext};
use super::writer::TelemetryWriter;

/// Severity of a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One structured log record. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub trace_context: TraceContext,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Destination for log records.
pub trait LogTransport: Send + Sync {
    /// Deliver one record. Must not block and must not panic.
    fn emit(&self, entry: &LogEntry);
}

/// Re-emits records as `tracing` events so they flow through the subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTransport;

impl LogTransport for TracingTransport {
    fn emit(&self, entry: &LogEntry) {
        let ctx = &entry.trace_context;
        let trace_id = ctx.trace_id.to_string();
        let span_id = ctx.span_id.to_string();
        let parent = ctx.parent_span_id.map(|p| p.to_string()).unwrap_or_default();
        let data = entry.data.as_ref().map(|d| d.to_string()).unwrap_or_default();
        let labels = if entry.labels.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&entry.labels).unwrap_or_default()
        };

        macro_rules! forward {
            ($macro:ident) => {
                tracing::$macro!(
                    target: "vigil::log",
                    trace_id = %trace_id,
                    span_id = %span_id,
                    parent_span_id = %parent,
                    labels = %labels,
                    data = %data,
                    "{}",
                    entry.message
                )
            };
        }

        match entry.level {
            LogLevel::Debug => forward!(debug),
            LogLevel::Info => forward!(info),
            LogLevel::Warn => forward!(warn),
            LogLevel::Error => forward!(error),
        }
    }
}

/// Writes one JSON object per line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLineTransport;

impl LogTransport for JsonLineTransport {
    fn emit(&self, entry: &LogEntry) {
        if let Ok(line) = serde_json::to_string(entry) {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let _ = writeln!(lock, "{}", line);
        }
    }
}

/// Keeps every record in memory. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl LogTransport for MemoryTransport {
    fn emit(&self, entry: &LogEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

/// Hands records to the batched [`TelemetryWriter`] for persistence.
#[derive(Clone)]
pub struct SinkTransport {
    writer: TelemetryWriter,
}

impl SinkTransport {
    pub fn new(writer: TelemetryWriter) -> Self {
        Self { writer }
    }
}

impl LogTransport for SinkTransport {
    fn emit(&self, entry: &LogEntry) {
        self.writer.write_log(entry.clone());
    }
}

/// Fans a record out to several transports.
pub struct FanoutTransport {
    transports: Vec<Arc<dyn LogTransport>>,
}

impl FanoutTransport {
    pub fn new(transports: Vec<Arc<dyn LogTransport>>) -> Self {
        Self { transports }
    }
}

impl LogTransport for FanoutTransport {
    fn emit(&self, entry: &LogEntry) {
        for transport in &self.transports {
            transport.emit(entry);
        }
    }
}

/// A logger bound to one [`TraceContext`].
///
/// Cheap to clone; children share the transport.
#[derive(Clone)]
pub struct StructuredLogger {
    context: TraceContext,
    labels: BTreeMap<String, String>,
    min_level: LogLevel,
    transport: Arc<dyn LogTransport>,
}

impl StructuredLogger {
    /// Create a root logger with a fresh trace.
    pub fn new(transport: Arc<dyn LogTransport>) -> Self {
        Self::with_seed(ContextSeed::default(), transport)
    }

    /// Create a logger from a partial context; missing ids are generated.
    pub fn with_seed(seed: ContextSeed, transport: Arc<dyn LogTransport>) -> Self {
        Self::with_context(seed.into(), transport)
    }

    /// Create a logger bound to an existing context.
    pub fn with_context(context: TraceContext, transport: Arc<dyn LogTransport>) -> Self {
        Self {
            context,
            labels: BTreeMap::new(),
            min_level: LogLevel::Debug,
            transport,
        }
    }

    /// Drop records below `level`.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Attach a label carried on every record from this logger and its children.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn context(&self) -> &TraceContext {
        &self.context
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Same trace, fresh span, parent set to this logger's span.
    ///
    /// `labels` are merged over the parent's labels.
    pub fn child<I, K, V>(&self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.labels.clone();
        merged.extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self {
            context: self.context.child(),
            labels: merged,
            min_level: self.min_level,
            transport: Arc::clone(&self.transport),
        }
    }

    /// Logger bound to `context` that keeps this logger's labels and transport.
    pub fn for_context(&self, context: TraceContext) -> Self {
        Self {
            context,
            labels: self.labels.clone(),
            min_level: self.min_level,
            transport: Arc::clone(&self.transport),
        }
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) {
        if level < self.min_level {
            return;
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            trace_context: self.context.clone(),
            labels: self.labels.clone(),
            data,
        };
        self.transport.emit(&entry);
    }

    pub fn debug(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.log(LogLevel::Debug, message, data);
    }

    pub fn info(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.log(LogLevel::Info, message, data);
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.log(LogLevel::Warn, message, data);
    }

    pub fn error(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.log(LogLevel::Error, message, data);
    }
}

impl fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("context", &self.context)
            .field("labels", &self.labels)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::context::TraceId;
    use serde_json::json;

    fn memory_logger() -> (StructuredLogger, Arc<MemoryTransport>) {
        let transport = Arc::new(MemoryTransport::new());
        (StructuredLogger::new(transport.clone()), transport)
    }

    #[test]
    fn test_emits_one_record_with_context() {
        let (logger, transport) = memory_logger();
        logger.info("invoice saved", Some(json!({"invoice_id": 42})));

        let entries = transport.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[0].trace_context, *logger.context());
        assert_eq!(entries[0].data, Some(json!({"invoice_id": 42})));
    }

    #[test]
    fn test_seed_keeps_trace_id() {
        let trace_id = TraceId::new();
        let transport = Arc::new(MemoryTransport::new());
        let logger = StructuredLogger::with_seed(
            ContextSeed {
                trace_id: Some(trace_id),
                ..Default::default()
            },
            transport,
        );
        assert_eq!(logger.context().trace_id, trace_id);
    }

    #[test]
    fn test_child_builds_causal_chain() {
        let (logger, transport) = memory_logger();
        let logger = logger.with_label("service", "invoices");
        let child = logger.child([("step", "validate")]);
        let grandchild = child.child(Vec::<(String, String)>::new());

        assert_eq!(child.context().trace_id, logger.context().trace_id);
        assert_eq!(child.context().parent_span_id, Some(logger.context().span_id));
        assert_eq!(grandchild.context().parent_span_id, Some(child.context().span_id));
        assert_eq!(child.labels().get("service").map(String::as_str), Some("invoices"));
        assert_eq!(child.labels().get("step").map(String::as_str), Some("validate"));

        child.warn("slow", None);
        assert_eq!(transport.entries()[0].labels.len(), 2);
    }

    #[test]
    fn test_min_level_filters() {
        let (logger, transport) = memory_logger();
        let logger = logger.with_min_level(LogLevel::Warn);
        logger.debug("noise", None);
        logger.info("noise", None);
        logger.error("kept", None);
        assert_eq!(transport.entries().len(), 1);
    }

    #[test]
    fn test_entry_serializes_as_json() {
        let (logger, transport) = memory_logger();
        logger.error("boom", None);
        let json = serde_json::to_value(&transport.entries()[0]).unwrap();
        assert_eq!(json["level"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json["trace_context"]["trace_id"].is_string());
        assert!(json.get("labels").is_none());
    }

    #[test]
    fn test_fanout() {
        let a = Arc::new(MemoryTransport::new());
        let b = Arc::new(MemoryTransport::new());
        let logger = StructuredLogger::new(Arc::new(FanoutTransport::new(vec![
            a.clone(),
            b.clone(),
            Arc::new(TracingTransport),
        ])));
        logger.info("both", None);
        assert_eq!(a.entries().len(), 1);
        assert_eq!(b.entries().len(), 1);
    }
}
