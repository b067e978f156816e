// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span lifecycle management.
//!
//! [`TracingManager`] owns the registry of active spans. A span is created by
//! [`TracingManager::start_span`], decorated with events and attributes, and
//! removed by [`TracingManager::end_span`], which logs it once. Bookkeeping
//! against an unknown span id is ignored: instrumentation must never fail the
//! code it observes.
//!
//! [`TracingManager::trace`] additionally installs the span as the task-local
//! current context while its future runs, so nested `trace`/`start_span`
//! calls become children without threading ids through by hand.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;

use super::context::{SpanId, TraceContext};
use super::logger::StructuredLogger;

tokio::task_local! {
    static CURRENT_CONTEXT: TraceContext;
}

/// The context of the innermost [`TracingManager::trace`] call on this task.
pub fn current_context() -> Option<TraceContext> {
    CURRENT_CONTEXT.try_with(Clone::clone).ok()
}

/// Role of a span in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
}

/// Outcome recorded when a span ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
}

/// A timestamped annotation on a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, Value>>,
}

/// Options for starting a span.
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub attributes: BTreeMap<String, Value>,
    pub kind: SpanKind,
    /// Explicit parent. Falls back to the task-local current context.
    pub parent: Option<TraceContext>,
}

impl SpanOptions {
    pub fn kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn parent(mut self, parent: TraceContext) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// An active span. Owned by the registry until it ends.
#[derive(Debug, Clone)]
pub struct Span {
    pub name: String,
    pub kind: SpanKind,
    pub context: TraceContext,
    pub start_time: Instant,
    pub attributes: BTreeMap<String, Value>,
    pub events: Vec<SpanEvent>,
}

impl Span {
    pub fn id(&self) -> SpanId {
        self.context.span_id
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Creates, annotates, and ends spans.
pub struct TracingManager {
    active: Mutex<HashMap<SpanId, Span>>,
    logger: StructuredLogger,
}

impl TracingManager {
    /// Root spans inherit tenant/route/user from `logger`'s context.
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            logger,
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SpanId, Span>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a span and register it as active.
    pub fn start_span(&self, name: &str, options: SpanOptions) -> SpanId {
        let context = match options.parent.or_else(current_context) {
            Some(parent) => parent.child(),
            None => {
                let base = self.logger.context();
                TraceContext {
                    tenant: base.tenant.clone(),
                    route: base.route.clone(),
                    user_id: base.user_id.clone(),
                    ..TraceContext::new_root()
                }
            }
        };
        let span_id = context.span_id;

        self.logger.for_context(context.clone()).debug(
            format!("Span started: {}", name),
            Some(json!({ "span_name": name, "kind": options.kind })),
        );

        self.registry().insert(
            span_id,
            Span {
                name: name.to_string(),
                kind: options.kind,
                context,
                start_time: Instant::now(),
                attributes: options.attributes,
                events: Vec::new(),
            },
        );
        span_id
    }

    /// End a span, log it, and drop it from the registry.
    ///
    /// Ending an unknown (or already ended) span logs a warning and does nothing else.
    pub fn end_span(&self, span_id: SpanId, status: SpanStatus, error: Option<&str>) {
        let removed = self.registry().remove(&span_id);
        let Some(span) = removed else {
            self.logger.warn(
                "Attempted to end unknown span",
                Some(json!({ "span_id": span_id.to_string() })),
            );
            return;
        };

        let duration = span.start_time.elapsed();
        let mut data = json!({
            "span_name": span.name,
            "kind": span.kind,
            "status": status,
            "duration_ms": duration.as_secs_f64() * 1000.0,
            "attributes": span.attributes,
            "events": span.events,
        });
        if let Some(error) = error {
            data["error"] = Value::String(error.to_string());
        }

        self.logger
            .for_context(span.context)
            .info(format!("Span completed: {}", span.name), Some(data));
    }

    /// Append an event to an active span. Unknown spans are ignored.
    pub fn add_span_event(
        &self,
        span_id: SpanId,
        name: &str,
        attributes: Option<BTreeMap<String, Value>>,
    ) {
        if let Some(span) = self.registry().get_mut(&span_id) {
            span.events.push(SpanEvent {
                name: name.to_string(),
                timestamp: Utc::now(),
                attributes,
            });
        }
    }

    /// Merge attributes into an active span. Unknown spans are ignored.
    pub fn set_span_attributes(&self, span_id: SpanId, attributes: BTreeMap<String, Value>) {
        if let Some(span) = self.registry().get_mut(&span_id) {
            span.attributes.extend(attributes);
        }
    }

    /// Context of an active span.
    pub fn span_context(&self, span_id: SpanId) -> Option<TraceContext> {
        self.registry().get(&span_id).map(|s| s.context.clone())
    }

    /// Snapshot of an active span.
    pub fn span(&self, span_id: SpanId) -> Option<Span> {
        self.registry().get(&span_id).cloned()
    }

    pub fn active_span_count(&self) -> usize {
        self.registry().len()
    }

    /// Run `f` inside a new span, ending it with the outcome of the future.
    ///
    /// Errors are recorded on the span and returned unchanged.
    pub async fn trace<F, Fut, T, E>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.trace_with(name, SpanOptions::default(), f).await
    }

    /// [`trace`](Self::trace) with explicit span options.
    pub async fn trace_with<F, Fut, T, E>(&self, name: &str, options: SpanOptions, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let span_id = self.start_span(name, options);
        let context = self
            .span_context(span_id)
            .unwrap_or_else(TraceContext::new_root);

        let result = CURRENT_CONTEXT.scope(context, async move { f().await }).await;

        match &result {
            Ok(_) => self.end_span(span_id, SpanStatus::Ok, None),
            Err(e) => self.end_span(span_id, SpanStatus::Error, Some(&e.to_string())),
        }
        result
    }

    /// End every span that has been open longer than `max_age` with an error status.
    ///
    /// Returns how many spans were swept.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<SpanId> = self
            .registry()
            .values()
            .filter(|s| s.start_time.elapsed() > max_age)
            .map(Span::id)
            .collect();

        for span_id in &stale {
            self.end_span(*span_id, SpanStatus::Error, Some("span abandoned"));
        }
        if !stale.is_empty() {
            tracing::warn!(count = stale.len(), "Swept abandoned spans");
        }
        stale.len()
    }
}

impl fmt::Debug for TracingManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingManager")
            .field("active_spans", &self.active_span_count())
            .finish_non_exhaustive()
    }
}
