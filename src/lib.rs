// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vigil - observability and resilience runtime for data-heavy applications.
//!
//! Trace propagation, structured logging, a deduplicating query cache, error
//! capture, SLO burn-rate alerting, and performance timing, all owned by one
//! explicitly constructed [`Vigil`] context.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`telemetry`] - Trace context, structured logger, span manager, batched writer
//! - [`cache`] - Request deduplication and the adaptive query cache
//! - [`error_tracker`] - Error capture, fingerprinting, and batched flush
//! - [`slo`] - SLO registration and multi-window burn-rate alerting
//! - [`performance`] - Vitals, component renders, API latency, HTTP middleware
//! - [`sink`] - Destinations for logs, errors, and violations
//! - [`config`] - Configuration loading and merging
//! - [`error`] - Error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil::{config::load_config, sink::MemorySink, Vigil};
//!
//! let vigil = Vigil::new(load_config(".")?, Arc::new(MemorySink::new()))?;
//! vigil.start()?;
//!
//! let invoices = vigil
//!     .tracer()
//!     .trace("list_invoices", || async {
//!         vigil
//!             .cache()
//!             .execute_query(Some("invoices:list"), Default::default(), || fetch_invoices())
//!             .await
//!     })
//!     .await?;
//!
//! vigil.shutdown().await?;
//! ```

pub mod app;
pub mod cache;
pub mod config;
pub mod error;
pub mod error_tracker;
pub mod performance;
pub mod sink;
pub mod slo;
pub mod task;
pub mod telemetry;
pub mod warning;

// Re-export commonly used types at crate root
pub use app::Vigil;
pub use cache::{QueryCache, QueryOptions, QueryOutcome, RequestDeduper};
pub use config::VigilConfig;
pub use error::{ConfigError, MonitorError, QueryError, Result, SinkError, TransportError};
pub use error_tracker::{ErrorContext, ErrorLevel, ErrorTracker};
pub use performance::PerformanceMonitor;
pub use slo::{SloDefinition, SloMonitor};
pub use telemetry::{StructuredLogger, TraceContext, TracingManager};
pub use warning::{RuntimeWarning, WarningHandler};

/// Vigil version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
