//! # Process Registry
//!
//! In-memory index of bulk runs by process id. The orchestrator owning a run
//! is its only writer; status polling and cancellation read it concurrently.
//!
//! Finished runs stay pollable for the configured retention and are then
//! evicted, either on the next registration or by the background sweeper.
//! A run that is not terminal is never evicted.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::process::BatchRun;
use super::result::BulkOperationResult;
use crate::clock::{system_clock, SharedClock};
use crate::config::RegistryConfig;
use crate::error::{OrchestrationError, OrchestrationResult};

/// Fold a terminal result into the run snapshot
pub(crate) fn apply_result(run: &mut BatchRun, result: &BulkOperationResult) {
    run.status = result.status;
    run.completed_at = Some(chrono::Utc::now());
    run.processed_items = result.summary.succeeded;
    run.failed_items = result.summary.failed;
    run.skipped_items = result.summary.skipped;
    run.error_message = result.error_message.clone();
    run.current_operation = None;
}

#[derive(Debug)]
struct RegistryEntry {
    run: BatchRun,
    result: Option<BulkOperationResult>,
    cancel: CancellationToken,
    finished_at: Option<Instant>,
    finished: Arc<Notify>,
}

#[derive(Debug)]
pub struct ProcessRegistry {
    runs: DashMap<Uuid, RegistryEntry>,
    retention: Duration,
    clock: SharedClock,
}

impl ProcessRegistry {
    pub fn new(retention: Duration) -> Self {
        Self::with_clock(retention, system_clock())
    }

    pub fn with_clock(retention: Duration, clock: SharedClock) -> Self {
        Self {
            runs: DashMap::new(),
            retention,
            clock,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.retention())
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Register a new `Pending` run and return its cancellation token
    pub fn register(&self, run: BatchRun) -> CancellationToken {
        self.evict_expired();

        let cancel = CancellationToken::new();
        let process_id = run.process_id;
        debug!(process_id = %process_id, operation = %run.operation_type, "Registering bulk run");
        self.runs.insert(
            process_id,
            RegistryEntry {
                run,
                result: None,
                cancel: cancel.clone(),
                finished_at: None,
                finished: Arc::new(Notify::new()),
            },
        );
        cancel
    }

    /// Apply one mutation to a live run; returns the updated snapshot
    ///
    /// Terminal runs are frozen and left untouched.
    pub fn update<F>(&self, process_id: Uuid, mutate: F) -> Option<BatchRun>
    where
        F: FnOnce(&mut BatchRun),
    {
        let mut entry = self.runs.get_mut(&process_id)?;
        if !entry.run.status.is_terminal() {
            mutate(&mut entry.run);
        }
        Some(entry.run.clone())
    }

    /// Record the terminal result and wake every waiter
    pub fn finish(&self, result: BulkOperationResult) -> Option<BatchRun> {
        let process_id = result.process_id;
        let (snapshot, finished) = {
            let mut entry = self.runs.get_mut(&process_id)?;
            apply_result(&mut entry.run, &result);

            let snapshot = entry.run.clone();
            entry.result = Some(result);
            entry.finished_at = Some(self.clock.now());
            (snapshot, entry.finished.clone())
        };

        finished.notify_waiters();
        Some(snapshot)
    }

    pub fn get(&self, process_id: Uuid) -> Option<BatchRun> {
        self.runs.get(&process_id).map(|entry| entry.run.clone())
    }

    pub fn result(&self, process_id: Uuid) -> Option<BulkOperationResult> {
        self.runs
            .get(&process_id)
            .and_then(|entry| entry.result.clone())
    }

    /// Runs that are pending or running
    pub fn active(&self) -> Vec<BatchRun> {
        let mut active: Vec<BatchRun> = self
            .runs
            .iter()
            .filter(|entry| entry.run.status.is_active())
            .map(|entry| entry.run.clone())
            .collect();
        active.sort_by_key(|run| run.started_at);
        active
    }

    pub fn is_cancelled(&self, process_id: Uuid) -> bool {
        self.runs
            .get(&process_id)
            .is_some_and(|entry| entry.cancel.is_cancelled())
    }

    /// Request cooperative cancellation
    ///
    /// Returns `true` when the run exists and is not terminal. The run stops
    /// at its next batch boundary.
    pub fn cancel(&self, process_id: Uuid) -> bool {
        let Some(mut entry) = self.runs.get_mut(&process_id) else {
            return false;
        };
        if entry.run.status.is_terminal() {
            return false;
        }

        entry.run.cancellation_requested = true;
        entry.cancel.cancel();
        info!(process_id = %process_id, "Cancellation requested");
        true
    }

    /// Wait until the run is terminal and return its result
    pub async fn wait(&self, process_id: Uuid) -> OrchestrationResult<BulkOperationResult> {
        loop {
            let finished = {
                let entry = self
                    .runs
                    .get(&process_id)
                    .ok_or(OrchestrationError::ProcessNotFound(process_id))?;
                if let Some(result) = &entry.result {
                    return Ok(result.clone());
                }
                entry.finished.clone()
            };

            let notified = finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // Re-check after registering interest so a concurrent finish is not missed
            if let Some(result) = self.result(process_id) {
                return Ok(result);
            }
            notified.await;
        }
    }

    /// Drop terminal runs older than the retention period
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let retention = self.retention;
        let before = self.runs.len();

        self.runs.retain(|_, entry| match entry.finished_at {
            Some(finished_at) if entry.run.status.is_terminal() => {
                now.saturating_duration_since(finished_at) < retention
            }
            _ => true,
        });

        let evicted = before.saturating_sub(self.runs.len());
        if evicted > 0 {
            debug!(evicted = evicted, "Evicted expired bulk runs");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Periodically evict expired runs until `shutdown` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.evict_expired();
                    }
                }
            }
            debug!("Process registry sweeper stopped");
        })
    }
}
