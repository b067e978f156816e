// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batched, non-blocking delivery of log records and SLO violations.
//!
//! Producers push through an unbounded channel and return immediately. A
//! background task groups records into batches (by size or interval, whichever
//! comes first) and writes them to the [`TelemetrySink`]. A failed batch stays
//! queued and is retried on the next tick, not on the next record; the queue
//! is capped at `max_pending` records per kind, dropping the oldest beyond that.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::SinkError;
use crate::sink::TelemetrySink;
use crate::slo::SloViolation;

use super::logger::LogEntry;

/// Batching parameters for the writer task.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Flush once this many records of one kind are pending.
    pub batch_size: usize,
    /// Flush at least this often.
    pub flush_interval: Duration,
    /// Upper bound on records held per kind while the sink is failing.
    pub max_pending: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(500),
            max_pending: 1000,
        }
    }
}

#[derive(Debug)]
enum WriterMessage {
    Log(LogEntry),
    Violation(SloViolation),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to the background writer. Clone freely.
#[derive(Clone, Debug)]
pub struct TelemetryWriter {
    sender: mpsc::UnboundedSender<WriterMessage>,
}

impl TelemetryWriter {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn TelemetrySink>, config: WriterConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer_task(sink, rx, config));
        (Self { sender: tx }, handle)
    }

    /// A writer whose task never runs; everything sent is discarded.
    pub fn disconnected() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { sender: tx }
    }

    /// Queue a log record (non-blocking).
    pub fn write_log(&self, entry: LogEntry) {
        let _ = self.sender.send(WriterMessage::Log(entry));
    }

    /// Queue an SLO violation (non-blocking).
    pub fn write_violation(&self, violation: SloViolation) {
        let _ = self.sender.send(WriterMessage::Violation(violation));
    }

    /// Attempt delivery of everything queued so far and wait for the attempt.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriterMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Final flush, then stop the task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriterMessage::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Whether the writer task has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Records of one kind awaiting delivery.
struct Backlog<T> {
    queue: VecDeque<T>,
    /// Records that arrived since the last delivery attempt.
    fresh: usize,
    /// The last attempt failed; only the ticker or an explicit flush retries.
    backing_off: bool,
    kind: &'static str,
}

impl<T> Backlog<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            queue: VecDeque::new(),
            fresh: 0,
            backing_off: false,
            kind,
        }
    }

    fn push(&mut self, item: T) {
        self.queue.push_back(item);
        self.fresh += 1;
    }

    /// Whether enough new records arrived to deliver before the next tick.
    fn batch_ready(&self, batch_size: usize) -> bool {
        !self.backing_off && self.fresh >= batch_size
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    /// Take the whole queue for a delivery attempt.
    fn take(&mut self) -> Option<Vec<T>> {
        self.fresh = 0;
        if self.queue.is_empty() {
            None
        } else {
            Some(self.queue.drain(..).collect())
        }
    }

    /// Record the outcome of delivering `batch`. A failed batch goes back in
    /// front and size-triggered attempts pause until the next success.
    fn settle(&mut self, batch: Vec<T>, result: Result<(), SinkError>, max_pending: usize) {
        let count = batch.len();
        match result {
            Ok(()) => {
                self.backing_off = false;
                tracing::trace!(kind = self.kind, count, "Flushed telemetry batch");
            }
            Err(e) => {
                self.backing_off = true;
                tracing::warn!(kind = self.kind, count, error = %e, "Telemetry batch delivery failed, will retry");
                requeue(&mut self.queue, batch);
                enforce_cap(&mut self.queue, max_pending, self.kind);
            }
        }
    }
}

struct Pending {
    logs: Backlog<LogEntry>,
    violations: Backlog<SloViolation>,
    config: WriterConfig,
}

impl Pending {
    fn new(config: WriterConfig) -> Self {
        Self {
            logs: Backlog::new("log"),
            violations: Backlog::new("violation"),
            config,
        }
    }

    async fn flush_all(&mut self, sink: &dyn TelemetrySink) {
        self.flush_logs(sink).await;
        self.flush_violations(sink).await;
    }

    async fn flush_logs(&mut self, sink: &dyn TelemetrySink) {
        let Some(batch) = self.logs.take() else {
            return;
        };
        let result = sink.write_logs(&batch).await;
        self.logs.settle(batch, result, self.config.max_pending);
    }

    async fn flush_violations(&mut self, sink: &dyn TelemetrySink) {
        let Some(batch) = self.violations.take() else {
            return;
        };
        let result = sink.write_violations(&batch).await;
        self.violations.settle(batch, result, self.config.max_pending);
    }
}

/// Put a failed batch back in front of anything that arrived meanwhile.
fn requeue<T>(queue: &mut VecDeque<T>, batch: Vec<T>) {
    for item in batch.into_iter().rev() {
        queue.push_front(item);
    }
}

fn enforce_cap<T>(queue: &mut VecDeque<T>, max: usize, kind: &str) {
    if queue.len() > max {
        let dropped = queue.len() - max;
        queue.drain(..dropped);
        tracing::warn!(kind, dropped, "Telemetry backlog over capacity, dropped oldest records");
    }
}

async fn writer_task(
    sink: Arc<dyn TelemetrySink>,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    config: WriterConfig,
) {
    let mut pending = Pending::new(config);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Some(WriterMessage::Log(entry)) => {
                        pending.logs.push(entry);
                        if pending.logs.batch_ready(config.batch_size) {
                            pending.flush_logs(sink.as_ref()).await;
                        }
                    }
                    Some(WriterMessage::Violation(violation)) => {
                        pending.violations.push(violation);
                        if pending.violations.batch_ready(config.batch_size) {
                            pending.flush_violations(sink.as_ref()).await;
                        }
                    }
                    Some(WriterMessage::Flush(ack)) => {
                        pending.flush_all(sink.as_ref()).await;
                        let _ = ack.send(());
                    }
                    Some(WriterMessage::Shutdown(ack)) => {
                        pending.flush_all(sink.as_ref()).await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        pending.flush_all(sink.as_ref()).await;
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                pending.flush_all(sink.as_ref()).await;
            }
        }
    }

    if !pending.logs.is_empty() || !pending.violations.is_empty() {
        tracing::warn!(
            logs = pending.logs.len(),
            violations = pending.violations.len(),
            "Telemetry writer stopped with undelivered records"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::telemetry::context::TraceContext;
    use crate::telemetry::logger::LogLevel;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now(),
            level: LogLevel::Info,
            message: message.to_string(),
            trace_context: TraceContext::new_root(),
            labels: Default::default(),
            data: None,
        }
    }

    #[tokio::test]
    async fn test_flush_delivers_batch() {
        let sink = Arc::new(MemorySink::new());
        let (writer, _handle) = TelemetryWriter::spawn(sink.clone(), WriterConfig::default());

        writer.write_log(entry("a"));
        writer.write_log(entry("b"));
        writer.flush().await;

        let logs = sink.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "a");
        assert_eq!(logs[1].message, "b");
    }

    #[tokio::test]
    async fn test_failed_batch_is_retried() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let (writer, _handle) = TelemetryWriter::spawn(sink.clone(), WriterConfig::default());

        writer.write_log(entry("first"));
        writer.flush().await;
        assert!(sink.logs().is_empty());

        sink.set_failing(false);
        writer.write_log(entry("second"));
        writer.flush().await;

        let messages: Vec<_> = sink.logs().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_backlog_is_capped() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let config = WriterConfig {
            max_pending: 3,
            ..Default::default()
        };
        let (writer, _handle) = TelemetryWriter::spawn(sink.clone(), config);

        for i in 0..5 {
            writer.write_log(entry(&format!("m{}", i)));
        }
        writer.flush().await;

        sink.set_failing(false);
        writer.flush().await;
        let messages: Vec<_> = sink.logs().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_and_stops() {
        let sink = Arc::new(MemorySink::new());
        let (writer, handle) = TelemetryWriter::spawn(sink.clone(), WriterConfig::default());

        writer.write_log(entry("last words"));
        writer.shutdown().await;
        handle.await.unwrap();

        assert_eq!(sink.logs().len(), 1);
        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn test_disconnected_discards() {
        let writer = TelemetryWriter::disconnected();
        writer.write_log(entry("ignored"));
        writer.flush().await;
        assert!(writer.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_sink_not_retried_per_record() {
        let sink = Arc::new(MemorySink::new());
        sink.set_failing(true);
        let config = WriterConfig {
            batch_size: 10,
            ..Default::default()
        };
        let (writer, _handle) = TelemetryWriter::spawn(sink.clone(), config);

        for i in 0..1_000 {
            writer.write_log(entry(&format!("m{}", i)));
        }
        writer.flush().await;
        // At most: the immediate first tick, one size-triggered batch, the explicit flush.
        let attempts = sink.attempts();
        assert!(attempts <= 3, "{} attempts against a failing sink", attempts);

        // The next tick retries the backlog, and size triggers resume after a success.
        sink.set_failing(false);
        tokio::time::sleep(config.flush_interval + Duration::from_millis(1)).await;
        assert_eq!(sink.logs().len(), 1_000);

        let before = sink.attempts();
        for i in 0..10 {
            writer.write_log(entry(&format!("n{}", i)));
        }
        writer.flush().await;
        assert_eq!(sink.attempts(), before + 1);
        assert_eq!(sink.logs().len(), 1_010);
    }
}
