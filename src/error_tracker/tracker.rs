// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error capture with batched delivery.
//!
//! Captured errors are queued in memory and delivered to the sink by
//! [`ErrorTracker::flush`], which runs on a timer once started and as soon as
//! the queue fills. A failed batch goes back to the front of the queue, and
//! until a flush succeeds again only the timer or an explicit call retries it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use chrono::Utc;
use serde_json::json;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::ErrorTrackerConfig;
use crate::error::{MonitorError, SinkError};
use crate::sink::SharedSink;
use crate::task::{PeriodicTask, TaskSlot};
use crate::telemetry::{current_context, StructuredLogger};

use super::breadcrumbs::BreadcrumbTrail;
use super::fingerprint::fingerprint;
use super::types::{Breadcrumb, ErrorContext, ErrorLevel, TrackedError};

#[derive(Default)]
struct Queue {
    errors: VecDeque<TrackedError>,
    /// Captures since the last flush attempt.
    fresh: usize,
    /// A size-triggered flush is scheduled but has not taken the queue yet.
    flush_requested: bool,
    /// The last flush failed.
    backing_off: bool,
}

struct Inner {
    queue: Mutex<Queue>,
    breadcrumbs: Mutex<BreadcrumbTrail>,
    defaults: RwLock<ErrorContext>,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Arc<Notify>,
    task: TaskSlot,
    sink: SharedSink,
    logger: StructuredLogger,
    config: ErrorTrackerConfig,
}

/// Captures errors and ships them to a sink in batches. Clone freely.
#[derive(Clone)]
pub struct ErrorTracker {
    inner: Arc<Inner>,
}

impl ErrorTracker {
    /// Create a tracker delivering to `sink`. Call [`start`](Self::start) for timed flushes.
    pub fn new(config: ErrorTrackerConfig, sink: SharedSink, logger: StructuredLogger) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Queue::default()),
                breadcrumbs: Mutex::new(BreadcrumbTrail::new(config.max_breadcrumbs)),
                defaults: RwLock::new(ErrorContext::default()),
                flush_lock: tokio::sync::Mutex::new(()),
                wake: Arc::new(Notify::new()),
                task: TaskSlot::new(),
                sink,
                logger: logger.with_label("component", "error_tracker"),
                config,
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn trail(&self) -> MutexGuard<'_, BreadcrumbTrail> {
        self.inner
            .breadcrumbs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `user_id` to every subsequent capture that does not name a user.
    pub fn set_user(&self, user_id: Option<String>) {
        self.inner
            .defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user_id = user_id;
    }

    /// Replace the context merged into every capture.
    pub fn set_default_context(&self, context: ErrorContext) {
        *self
            .inner
            .defaults
            .write()
            .unwrap_or_else(PoisonError::into_inner) = context;
    }

    /// Record a breadcrumb attached to later captures.
    pub fn add_breadcrumb(&self, crumb: Breadcrumb) {
        self.trail().push(crumb);
    }

    /// Current breadcrumb trail, oldest first.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        self.trail().snapshot()
    }

    /// Queue an error. Returns its id.
    pub fn capture_error(
        &self,
        message: impl Into<String>,
        stack: Option<String>,
        context: ErrorContext,
        level: ErrorLevel,
    ) -> String {
        let message = message.into();
        let stack = stack.filter(|s| !s.trim().is_empty());

        let mut context = {
            let defaults = self
                .inner
                .defaults
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            context.inherit(&defaults)
        };
        if context.trace_id.is_none() {
            context.trace_id = current_context().map(|c| c.trace_id.to_string());
        }

        let error = TrackedError {
            id: Uuid::new_v4().to_string(),
            fingerprint: fingerprint(&message, stack.as_deref()),
            message,
            stack,
            level,
            context,
            breadcrumbs: self.breadcrumbs(),
            timestamp: Utc::now(),
        };

        self.inner.logger.log(
            level.log_level(),
            format!("Captured error: {}", error.message),
            Some(json!({
                "error_id": error.id,
                "fingerprint": error.fingerprint,
                "level": level.as_str(),
                "context": error.context,
            })),
        );

        let id = error.id.clone();
        let trigger = {
            let mut queue = self.queue();
            queue.errors.push_back(error);
            queue.fresh += 1;
            let ready = queue.fresh >= self.inner.config.max_queue_size
                && !queue.flush_requested
                && !queue.backing_off;
            if ready {
                queue.flush_requested = true;
            }
            ready
        };
        if trigger {
            self.flush_soon();
        }
        id
    }

    /// Capture a `std::error::Error`; its source chain becomes the stack.
    pub fn capture_exception<E>(&self, error: &E, context: ErrorContext) -> String
    where
        E: std::error::Error + ?Sized,
    {
        let mut frames = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            frames.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        let stack = (!frames.is_empty()).then(|| frames.join("\n"));
        self.capture_error(error.to_string(), stack, context, ErrorLevel::Error)
    }

    /// Capture an `anyhow::Error`; its context chain becomes the stack.
    pub fn capture_anyhow(&self, error: &anyhow::Error, context: ErrorContext) -> String {
        let frames: Vec<String> = error
            .chain()
            .skip(1)
            .map(|cause| format!("caused by: {}", cause))
            .collect();
        let stack = (!frames.is_empty()).then(|| frames.join("\n"));
        self.capture_error(error.to_string(), stack, context, ErrorLevel::Error)
    }

    /// Capture a plain message at `level`.
    pub fn capture_message(&self, message: impl Into<String>, level: ErrorLevel) -> String {
        self.capture_error(message, None, ErrorContext::default(), level)
    }

    /// Errors captured but not yet delivered.
    pub fn pending_count(&self) -> usize {
        self.queue().errors.len()
    }

    /// Deliver everything queued. Returns how many records were delivered.
    ///
    /// On failure the batch is put back ahead of anything captured meanwhile,
    /// so the next flush retries it first.
    pub async fn flush(&self) -> Result<usize, SinkError> {
        let _guard = self.inner.flush_lock.lock().await;

        let batch: Vec<TrackedError> = {
            let mut queue = self.queue();
            queue.fresh = 0;
            queue.flush_requested = false;
            queue.errors.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        match self.inner.sink.write_errors(&batch).await {
            Ok(()) => {
                self.queue().backing_off = false;
                tracing::debug!(count = batch.len(), "Flushed tracked errors");
                Ok(batch.len())
            }
            Err(e) => {
                tracing::warn!(count = batch.len(), error = %e, "Error flush failed, will retry");
                let mut queue = self.queue();
                queue.backing_off = true;
                for error in batch.into_iter().rev() {
                    queue.errors.push_front(error);
                }
                let max = self.inner.config.max_pending;
                if queue.errors.len() > max {
                    let dropped = queue.errors.len() - max;
                    queue.errors.drain(..dropped);
                    tracing::warn!(dropped, "Tracked error backlog over capacity, dropped oldest");
                }
                Err(e)
            }
        }
    }

    fn flush_soon(&self) {
        if self.inner.task.is_running() {
            self.inner.wake.notify_one();
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tracker = self.clone();
                handle.spawn(async move {
                    let _ = tracker.flush().await;
                });
            }
            Err(_) => {
                self.queue().flush_requested = false;
                tracing::debug!("Error queue full outside a runtime, flush deferred");
            }
        }
    }

    /// Start the periodic flush. Errors if it is already running.
    pub fn start(&self) -> Result<(), MonitorError> {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.flush_interval();
        let wake = Arc::clone(&self.inner.wake);
        self.inner.task.start("error flush", || {
            PeriodicTask::spawn("error flush", period, Some(wake), move || {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => {
                            let _ = ErrorTracker { inner }.flush().await;
                            true
                        }
                        None => false,
                    }
                }
            })
        })
    }

    /// Whether the periodic flush is active.
    pub fn is_running(&self) -> bool {
        self.inner.task.is_running()
    }

    /// Stop the periodic flush and deliver whatever is left.
    pub async fn shutdown(&self) -> Result<usize, SinkError> {
        self.inner.task.stop().await;
        self.flush().await
    }
}

impl std::fmt::Debug for ErrorTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorTracker")
            .field("pending", &self.pending_count())
            .field("running", &self.is_running())
            .field("sink", &self.inner.sink.name())
            .finish()
    }
}
