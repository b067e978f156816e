// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stoppable periodic background tasks.
//!
//! A [`TaskSlot`] holds at most one running [`PeriodicTask`]. Starting an
//! occupied slot is an error rather than a silent second timer.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::error::MonitorError;

/// Shortest period a task will run at; `tokio` rejects a zero interval.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A spawned loop that runs `tick` every period until stopped.
#[derive(Debug)]
pub struct PeriodicTask {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn the loop. The first tick fires one `period` after spawning.
    /// A zero `period` is raised to one millisecond.
    ///
    /// `wake`, when given, triggers an extra tick as soon as it is notified.
    /// `tick` returns `false` to end the loop on its own.
    pub fn spawn<F, Fut>(
        name: &'static str,
        period: Duration,
        wake: Option<Arc<Notify>>,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let wake = wake.unwrap_or_else(|| Arc::new(Notify::new()));

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if !tick().await {
                            break;
                        }
                    }
                    _ = wake.notified() => {
                        if !tick().await {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            stop_tx,
            handle,
        }
    }

    /// Name used in logs and lifecycle errors.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(task = self.name, error = %e, "Periodic task ended abnormally");
        }
    }
}

/// Holder guaranteeing at most one running task.
#[derive(Debug, Default)]
pub struct TaskSlot {
    task: Mutex<Option<PeriodicTask>>,
}

impl TaskSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a task built by `spawn`. Errors if one is already running.
    pub fn start<S>(&self, name: &'static str, spawn: S) -> Result<(), MonitorError>
    where
        S: FnOnce() -> PeriodicTask,
    {
        let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(MonitorError::AlreadyRunning(name));
        }
        *slot = Some(spawn());
        Ok(())
    }

    /// Stop the running task, if any. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        match task {
            Some(task) => {
                task.stop().await;
                true
            }
            None => false,
        }
    }

    /// Whether a task is installed and still looping.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}
