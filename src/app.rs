// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Application context owning one instance of every runtime component.
//!
//! Build a [`Vigil`] once at startup and hand out references (or the `Arc`s it
//! exposes) to the code that needs tracing, caching, or error capture.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use tokio::task::JoinHandle;

use crate::cache::{QueryCache, RequestDeduper};
use crate::config::VigilConfig;
use crate::error::{MonitorError, Result};
use crate::error_tracker::ErrorTracker;
use crate::performance::PerformanceMonitor;
use crate::sink::{create_sink, SharedSink};
use crate::slo::SloMonitor;
use crate::telemetry::{
    FanoutTransport, LogLevel, LogTransport, SinkTransport, StructuredLogger, TelemetryWriter,
    TracingManager, TracingTransport, WriterConfig,
};
use crate::warning::WarningHandler;

/// Runtime context. Must be created inside a tokio runtime.
pub struct Vigil {
    config: VigilConfig,
    sink: SharedSink,
    writer: TelemetryWriter,
    writer_handle: Mutex<Option<JoinHandle<()>>>,
    logger: StructuredLogger,
    tracer: Arc<TracingManager>,
    deduper: RequestDeduper,
    cache: Arc<QueryCache>,
    errors: ErrorTracker,
    slo: Arc<SloMonitor>,
    performance: Arc<PerformanceMonitor>,
}

impl Vigil {
    /// Validate `config` and wire every component to `sink`.
    pub fn new(config: VigilConfig, sink: SharedSink) -> Result<Self> {
        Self::build(config, sink, None)
    }

    /// Like [`new`](Self::new), forwarding performance warnings to `handler`.
    pub fn with_warning_handler(
        config: VigilConfig,
        sink: SharedSink,
        handler: WarningHandler,
    ) -> Result<Self> {
        Self::build(config, sink, Some(handler))
    }

    /// Build with the sink named in the configuration.
    pub fn from_config(config: VigilConfig) -> Result<Self> {
        let sink = create_sink(&config.sink).context("Failed to open telemetry sink")?;
        Self::new(config, sink)
    }

    fn build(config: VigilConfig, sink: SharedSink, warnings: Option<WarningHandler>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let (writer, writer_handle) = TelemetryWriter::spawn(
            Arc::clone(&sink),
            WriterConfig {
                max_pending: config.errors.max_pending,
                ..Default::default()
            },
        );

        let transports: Vec<Arc<dyn LogTransport>> = vec![
            Arc::new(TracingTransport),
            Arc::new(SinkTransport::new(writer.clone())),
        ];
        let logger = StructuredLogger::new(Arc::new(FanoutTransport::new(transports)))
            .with_min_level(min_level(&config.logging.level))
            .with_label("service", config.logging.service.clone());

        let tracer = Arc::new(TracingManager::new(logger.clone()));
        let deduper = RequestDeduper::new();

        let mut cache = QueryCache::with_deduper(config.cache.clone(), deduper.clone());
        let mut performance = PerformanceMonitor::new(config.performance.clone());
        if let Some(handler) = &warnings {
            cache = cache.with_warning_handler(Arc::clone(handler));
            performance = performance.with_warning_handler(Arc::clone(handler));
        }
        let cache = Arc::new(cache);
        let performance = Arc::new(performance.with_query_cache(Arc::clone(&cache)));

        let errors = ErrorTracker::new(config.errors.clone(), Arc::clone(&sink), logger.clone());
        let slo = Arc::new(SloMonitor::from_config(&config.slo)?.with_writer(writer.clone()));

        tracing::debug!(sink = sink.name(), "Runtime context created");

        Ok(Self {
            config,
            sink,
            writer,
            writer_handle: Mutex::new(Some(writer_handle)),
            logger,
            tracer,
            deduper,
            cache,
            errors,
            slo,
            performance,
        })
    }

    /// Start the cache sweep and the periodic error flush.
    ///
    /// Starting twice is an error; nothing is started twice.
    pub fn start(&self) -> std::result::Result<(), MonitorError> {
        self.cache.start_periodic_cleanup()?;
        if let Err(e) = self.errors.start() {
            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                let _ = cache.stop_periodic_cleanup().await;
            });
            return Err(e);
        }
        tracing::info!("Background tasks started");
        Ok(())
    }

    /// Stop background tasks and deliver everything still queued.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.cache.stop_periodic_cleanup().await {
            tracing::debug!(error = %e, "Cache sweep was not running");
        }
        let flushed = self.errors.shutdown().await;

        self.writer.shutdown().await;
        let handle = self
            .writer_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Telemetry writer ended abnormally");
            }
        }

        let flushed = flushed.context("Final error flush failed")?;
        tracing::info!(flushed, "Shut down");
        Ok(())
    }

    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn writer(&self) -> &TelemetryWriter {
        &self.writer
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn tracer(&self) -> &Arc<TracingManager> {
        &self.tracer
    }

    pub fn deduper(&self) -> &RequestDeduper {
        &self.deduper
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn errors(&self) -> &ErrorTracker {
        &self.errors
    }

    pub fn slo(&self) -> &Arc<SloMonitor> {
        &self.slo
    }

    pub fn performance(&self) -> &Arc<PerformanceMonitor> {
        &self.performance
    }
}

impl std::fmt::Debug for Vigil {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vigil")
            .field("sink", &self.sink.name())
            .field("cache", &self.cache)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Map a `tracing`-style level name to the structured logger's minimum level.
fn min_level(level: &str) -> LogLevel {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" => LogLevel::Debug,
        "warn" | "warning" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_tracker::ErrorLevel;
    use crate::sink::MemorySink;
    use crate::slo::SloDefinition;

    fn config_with_slo() -> VigilConfig {
        let mut config = VigilConfig::default();
        config.slo.objectives.push(SloDefinition::new("api", 0.99, "30d"));
        config
    }

    #[test]
    fn test_min_level() {
        assert_eq!(min_level("TRACE"), LogLevel::Debug);
        assert_eq!(min_level("warn"), LogLevel::Warn);
        assert_eq!(min_level("bogus"), LogLevel::Info);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = VigilConfig::default();
        config.cache.max_size = 0;
        assert!(Vigil::new(config, Arc::new(MemorySink::new())).is_err());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let vigil = Vigil::new(VigilConfig::default(), Arc::new(MemorySink::new())).unwrap();
        vigil.start().unwrap();
        assert!(matches!(vigil.start(), Err(MonitorError::AlreadyRunning(_))));
        vigil.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_delivers_everything() {
        let sink = Arc::new(MemorySink::new());
        let vigil = Vigil::new(config_with_slo(), sink.clone()).unwrap();
        vigil.start().unwrap();

        vigil.logger().info("invoice approved", None);
        vigil.errors().capture_message("afe over budget", ErrorLevel::Warning);
        vigil.slo().record_error("api").unwrap();

        vigil.shutdown().await.unwrap();

        assert!(sink.logs().iter().any(|l| l.message == "invoice approved"));
        assert_eq!(sink.errors().len(), 1);
        assert_eq!(sink.violations().len(), 4);
    }
}
