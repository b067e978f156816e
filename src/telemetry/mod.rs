// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace propagation, structured logging, and telemetry delivery.
//!
//! - **Context**: W3C-shaped trace/span ids and the immutable [`TraceContext`]
//! - **Logger**: [`StructuredLogger`] emits JSON-serializable [`LogEntry`] records
//!   bound to a context; `child()` builds causal chains
//! - **Tracer**: [`TracingManager`] owns the span lifecycle and the `trace()` wrapper
//! - **Writer**: [`TelemetryWriter`] batches records to a [`crate::sink::TelemetrySink`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::telemetry::{StructuredLogger, TracingManager, TracingTransport};
//!
//! let logger = StructuredLogger::new(Arc::new(TracingTransport));
//! let tracer = TracingManager::new(logger);
//!
//! let invoice = tracer
//!     .trace("load_invoice", || async { repo.load(id).await })
//!     .await?;
//! ```

mod context;
mod init;
mod logger;
mod tracer;
mod writer;

pub use context::{ContextSeed, SpanId, TraceContext, TraceId};
pub use init::{init_telemetry, TelemetryGuard};
pub use logger::{
    FanoutTransport, JsonLineTransport, LogEntry, LogLevel, LogTransport, MemoryTransport,
    SinkTransport, StructuredLogger, TracingTransport,
};
pub use tracer::{
    current_context, Span, SpanEvent, SpanKind, SpanOptions, SpanStatus, TracingManager,
};
pub use writer::{TelemetryWriter, WriterConfig};
