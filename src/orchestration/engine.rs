//! # Batch Engine
//!
//! Executes one bulk run: partitions items into batches, keeps up to
//! `max_concurrency` batches in flight, and caps in-flight item calls with a
//! run-wide semaphore of the same size.
//!
//! ## Stop rules
//!
//! - Cancellation is observed between batches; in-flight batches finish.
//! - `continue_on_error = false`: the first failed batch stops scheduling.
//! - `continue_on_error = true`: scheduling stops once cumulative failures
//!   exceed `acceptable_error_percentage` of all submitted items.
//! - The run timeout aborts in-flight batches.
//!
//! Stopping drains what is in flight; items never started are reported as
//! skipped. An item whose processing panics is recorded as an `INTERNAL`
//! failure and counts toward the stop rules like any other failure.
//!
//! Collaborator calls are bounded by the collaborator timeout so a hung
//! notifier cannot hold the run past its deadline.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::collaborators::Collaborators;
use super::items::WorkItem;
use super::options::BulkOperationOptions;
use super::process::{failure_percentage, BatchRun, ProcessStatus};
use super::processors::ItemProcessor;
use super::registry::{apply_result, ProcessRegistry};
use super::result::{BulkOperationResult, ErrorRateSummary, ItemError, ItemSuccess, SkippedItem};
use crate::constants::events;
use crate::error::{DirectoryError, DirectoryResult, OrchestrationError};
use crate::logging::{log_bulk_operation, log_error};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};

/// Everything a run needs besides its items
#[derive(Debug, Clone)]
pub(crate) struct RunEnvironment {
    pub registry: Arc<ProcessRegistry>,
    pub collaborators: Collaborators,
    /// Breaker guarding collaborator calls
    pub external: Arc<CircuitBreaker>,
    /// Budget for each collaborator call
    pub collaborator_timeout: Duration,
    pub admin_summary_threshold: usize,
}

pub(crate) struct RunPlan<I: WorkItem> {
    pub run: BatchRun,
    pub items: Vec<I>,
    pub options: BulkOperationOptions,
    pub processor: Arc<dyn ItemProcessor<I>>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
enum ItemOutcome {
    Succeeded(ItemSuccess, Vec<String>),
    Failed(ItemError),
}

#[derive(Debug)]
struct BatchOutcome {
    batch_index: usize,
    outcomes: Vec<(usize, ItemOutcome)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    StopOnError,
    ErrorThreshold,
    TimedOut,
}

impl StopReason {
    fn skip_reason(&self) -> &'static str {
        match self {
            Self::Cancelled => "run cancelled before the item was processed",
            Self::StopOnError => "run stopped after a failed batch",
            Self::ErrorThreshold => "run stopped after exceeding the acceptable error percentage",
            Self::TimedOut => "run timed out before the item completed",
        }
    }
}

impl RunEnvironment {
    /// Call a collaborator through the external breaker; failures are logged, never raised
    async fn notify<F, Fut>(&self, operation: &str, call: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DirectoryResult<()>>,
    {
        let budget = self.collaborator_timeout;
        let bounded = || async move {
            tokio::time::timeout(budget, call())
                .await
                .unwrap_or_else(|_| {
                    Err(DirectoryError::Timeout {
                        operation: operation.to_string(),
                        timeout: budget,
                    })
                })
        };
        match self.external.call(bounded).await {
            Ok(()) => {}
            Err(CircuitBreakerError::CircuitOpen { component }) => {
                debug!(operation = operation, component = %component, "Collaborator call short-circuited");
            }
            Err(CircuitBreakerError::OperationFailed(error)) => {
                warn!(operation = operation, error = %error, "Collaborator call failed");
            }
            Err(CircuitBreakerError::ConfigurationError(message)) => {
                warn!(operation = operation, error = %message, "Collaborator breaker misconfigured");
            }
        }
    }
}

async fn run_batch<I: WorkItem>(
    batch_index: usize,
    batch: Vec<(usize, I)>,
    processor: Arc<dyn ItemProcessor<I>>,
    semaphore: Arc<Semaphore>,
    dry_run: bool,
) -> BatchOutcome {
    let outcomes = join_all(batch.into_iter().map(|(index, item)| {
        let processor = Arc::clone(&processor);
        let semaphore = Arc::clone(&semaphore);
        async move {
            let key = item.key();
            let operation = item.operation();

            let result = match semaphore.acquire().await {
                Ok(_permit) => AssertUnwindSafe(processor.process(&item, dry_run))
                    .catch_unwind()
                    .await
                    .map_err(|panic| panic_message(panic.as_ref())),
                Err(_) => Ok(Err(DirectoryError::permanent(operation, "admission closed"))),
            };

            let outcome = match result {
                Err(panic) => {
                    log_error("bulk_engine", operation, &panic, Some(&key));
                    ItemOutcome::Failed(ItemError::internal(
                        &key,
                        operation,
                        format!("item processing panicked: {panic}"),
                    ))
                }
                Ok(Ok(report)) => ItemOutcome::Succeeded(
                    ItemSuccess {
                        entity_id: key,
                        operation: operation.to_string(),
                        message: report.message,
                    },
                    report.affected,
                ),
                Ok(Err(error)) => {
                    if error.is_expected_backpressure() {
                        debug!(item = %key, operation = operation, error = %error, "Item short-circuited");
                    } else {
                        warn!(item = %key, operation = operation, error = %error, "Item failed");
                    }
                    ItemOutcome::Failed(ItemError::from_directory(&key, operation, &error))
                }
            };
            (index, outcome)
        }
    }))
    .await;

    BatchOutcome {
        batch_index,
        outcomes,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `plan` to completion and record its result in the registry
#[instrument(skip_all, fields(process_id = %plan.run.process_id, operation = %plan.run.operation_type))]
pub(crate) async fn execute_run<I: WorkItem>(
    plan: RunPlan<I>,
    env: RunEnvironment,
) -> BulkOperationResult {
    let started = Instant::now();
    let RunPlan {
        run,
        items,
        options,
        processor,
        cancel,
    } = plan;
    let process_id = run.process_id;
    let operation_type = run.operation_type.clone();
    let initiated_by = run.initiated_by.clone();
    let total = items.len();

    let running = env
        .registry
        .update(process_id, |run| run.status = ProcessStatus::Running)
        .unwrap_or_else(|| run.clone());
    log_bulk_operation(&operation_type, process_id, "running", total, None);
    env.notify("record_started", || env.collaborators.history.record_started(&running))
        .await;

    let labels: Vec<(String, &'static str)> =
        items.iter().map(|item| (item.key(), item.operation())).collect();
    let batches: Vec<Vec<(usize, I)>> = items
        .into_iter()
        .enumerate()
        .collect::<Vec<_>>()
        .chunks(options.batch_size)
        .map(<[(usize, I)]>::to_vec)
        .collect();
    let batch_count = batches.len();
    let mut pending = batches.into_iter().enumerate();

    let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
    let mut in_flight: JoinSet<BatchOutcome> = JoinSet::new();
    let mut outcomes: Vec<Option<ItemOutcome>> = (0..total).map(|_| None).collect();
    let mut dispatched = vec![false; total];
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut stop: Option<StopReason> = None;

    let deadline = tokio::time::sleep(options.timeout());
    tokio::pin!(deadline);

    loop {
        while stop.is_none() && in_flight.len() < options.max_concurrency && pending.len() > 0 {
            if cancel.is_cancelled() {
                info!(event = events::BULK_CANCELLED, remaining_batches = pending.len(), "Cancellation observed between batches");
                stop = Some(StopReason::Cancelled);
                break;
            }
            if let Some((batch_index, batch)) = pending.next() {
                debug!(batch = batch_index + 1, of = batch_count, items = batch.len(), "Scheduling batch");
                for (index, _) in &batch {
                    dispatched[*index] = true;
                }
                in_flight.spawn(run_batch(
                    batch_index,
                    batch,
                    Arc::clone(&processor),
                    Arc::clone(&semaphore),
                    options.dry_run,
                ));
            }
        }

        if in_flight.is_empty() {
            break;
        }

        tokio::select! {
            _ = &mut deadline => {
                warn!(event = events::BULK_TIMED_OUT, timeout_minutes = options.timeout_minutes, "Run timed out, aborting in-flight batches");
                stop = Some(StopReason::TimedOut);
                in_flight.abort_all();
                while in_flight.join_next().await.is_some() {}
                break;
            }
            joined = in_flight.join_next() => {
                let Some(joined) = joined else { continue };
                let batch = match joined {
                    Ok(batch) => batch,
                    Err(join_error) => {
                        // Its items are recorded as internal failures once the run drains
                        log_error("bulk_engine", &operation_type, &join_error.to_string(), Some("batch task"));
                        if stop.is_none() && !options.continue_on_error {
                            stop = Some(StopReason::StopOnError);
                        }
                        continue;
                    }
                };

                let mut batch_failed = false;
                let mut affected = Vec::new();
                for (index, outcome) in batch.outcomes {
                    match &outcome {
                        ItemOutcome::Succeeded(_, touched) => {
                            succeeded += 1;
                            affected.extend(touched.iter().cloned());
                        }
                        ItemOutcome::Failed(_) => {
                            failed += 1;
                            batch_failed = true;
                        }
                    }
                    outcomes[index] = Some(outcome);
                }

                let label = format!("batch {}/{}", batch.batch_index + 1, batch_count);
                let snapshot = env.registry.update(process_id, |run| {
                    run.processed_items = succeeded;
                    run.failed_items = failed;
                    run.current_operation = Some(label);
                    run.affected_entities.extend(affected);
                });
                info!(
                    event = events::BATCH_COMPLETED,
                    batch = batch.batch_index + 1,
                    of = batch_count,
                    succeeded = succeeded,
                    failed = failed,
                    "Batch completed"
                );

                if let (true, Some(snapshot)) = (options.notify_user, snapshot) {
                    env.notify("progress", || env.collaborators.progress.progress(&initiated_by, &snapshot))
                        .await;
                }

                if stop.is_none() {
                    if !options.continue_on_error && batch_failed {
                        warn!(failed = failed, "Batch failed with continue_on_error disabled, stopping");
                        stop = Some(StopReason::StopOnError);
                    } else if options.continue_on_error
                        && failure_percentage(failed, total) > options.acceptable_error_percentage
                    {
                        warn!(
                            event = events::BULK_EARLY_TERMINATION,
                            failure_percentage = failure_percentage(failed, total),
                            acceptable = options.acceptable_error_percentage,
                            "Acceptable error percentage exceeded, stopping"
                        );
                        stop = Some(StopReason::ErrorThreshold);
                    }
                }
            }
        }
    }

    let skip_reason = stop.map_or("item was not processed", |reason| reason.skip_reason());
    let mut successes = Vec::with_capacity(succeeded);
    let mut errors = Vec::with_capacity(failed);
    let mut skipped = Vec::new();
    let timed_out = stop == Some(StopReason::TimedOut);
    for ((outcome, started), (key, operation)) in outcomes.into_iter().zip(dispatched).zip(labels) {
        match outcome {
            Some(ItemOutcome::Succeeded(success, _)) => successes.push(success),
            Some(ItemOutcome::Failed(error)) => errors.push(error),
            None if started && !timed_out => errors.push(ItemError::internal(
                &key,
                operation,
                "batch task ended without reporting this item",
            )),
            None => skipped.push(SkippedItem {
                entity_id: key,
                operation: operation.to_string(),
                reason: skip_reason.to_string(),
            }),
        }
    }

    let summary = ErrorRateSummary::new(total, successes.len(), errors.len(), skipped.len());
    let (status, error_message) = match stop {
        Some(StopReason::TimedOut) => (
            ProcessStatus::Failed,
            Some(
                OrchestrationError::TimeoutExceeded {
                    minutes: options.timeout_minutes,
                }
                .to_string(),
            ),
        ),
        Some(StopReason::Cancelled) => (
            ProcessStatus::Cancelled,
            Some(OrchestrationError::CancellationRequested(process_id).to_string()),
        ),
        Some(StopReason::StopOnError) => (
            ProcessStatus::Failed,
            Some(format!(
                "stopped after {} failed item(s) with continue_on_error disabled",
                summary.failed
            )),
        ),
        Some(StopReason::ErrorThreshold) => (
            ProcessStatus::Failed,
            Some(format!(
                "failure rate {:.1}% exceeded the acceptable {:.1}%",
                summary.failure_percentage, options.acceptable_error_percentage
            )),
        ),
        None if summary.failed == 0 => (ProcessStatus::Completed, None),
        None if summary.failure_percentage <= options.acceptable_error_percentage => {
            (ProcessStatus::CompletedWithErrors, None)
        }
        None => (
            ProcessStatus::Failed,
            Some(format!(
                "failure rate {:.1}% exceeded the acceptable {:.1}%",
                summary.failure_percentage, options.acceptable_error_percentage
            )),
        ),
    };

    let result = BulkOperationResult {
        process_id,
        operation_type: operation_type.clone(),
        status,
        success: status.is_success(),
        successes,
        errors,
        skipped,
        summary,
        dry_run: options.dry_run,
        duration_ms: started.elapsed().as_millis() as u64,
        error_message,
    };

    let mut final_run = env.registry.get(process_id).unwrap_or(running);
    apply_result(&mut final_run, &result);

    env.notify("record_finished", || {
        env.collaborators.history.record_finished(&final_run, &result)
    })
    .await;
    if options.notify_user {
        env.notify("completed", || env.collaborators.progress.completed(&initiated_by, &result))
            .await;
    }
    if options.notify_admins && total >= env.admin_summary_threshold {
        env.notify("bulk_summary", || env.collaborators.admin.bulk_summary(&initiated_by, &result))
            .await;
    }

    log_bulk_operation(
        &operation_type,
        process_id,
        &status.to_string(),
        total,
        result.error_message.as_deref(),
    );
    info!(
        event = events::BULK_FINISHED,
        status = %status,
        succeeded = result.summary.succeeded,
        failed = result.summary.failed,
        skipped = result.summary.skipped,
        duration_ms = result.duration_ms,
        "Bulk run finished"
    );

    env.registry.finish(result.clone());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::items::ArchiveTarget;
    use crate::orchestration::processors::ItemReport;
    use crate::resilience::CircuitBreakerConfig;
    use async_trait::async_trait;

    /// Archives every team except one, where it panics
    struct PanicsOn(&'static str);

    #[async_trait]
    impl ItemProcessor<ArchiveTarget> for PanicsOn {
        async fn process(&self, item: &ArchiveTarget, _dry_run: bool) -> DirectoryResult<ItemReport> {
            if item.team_id == self.0 {
                panic!("processor bug on {}", item.team_id);
            }
            Ok(ItemReport::new("archived", vec![item.team_id.clone()]))
        }
    }

    async fn run_archival(
        processor: Arc<dyn ItemProcessor<ArchiveTarget>>,
        options: BulkOperationOptions,
        count: usize,
    ) -> BulkOperationResult {
        let registry = Arc::new(ProcessRegistry::new(Duration::from_secs(1800)));
        let items: Vec<ArchiveTarget> = (0..count)
            .map(|i| ArchiveTarget::new(format!("team-{i}")))
            .collect();
        let run = BatchRun::new("team_archival", "admin@school.edu", items.len(), false);
        let cancel = registry.register(run.clone());
        let env = RunEnvironment {
            registry,
            collaborators: Collaborators::default(),
            external: Arc::new(CircuitBreaker::new(
                "external".to_string(),
                CircuitBreakerConfig::default(),
            )),
            collaborator_timeout: Duration::from_secs(5),
            admin_summary_threshold: 50,
        };

        execute_run(
            RunPlan {
                run,
                items,
                options,
                processor,
                cancel,
            },
            env,
        )
        .await
    }

    #[tokio::test]
    async fn test_panicking_item_is_an_internal_failure() {
        let options = BulkOperationOptions::default()
            .without_notifications()
            .with_batch_size(2)
            .with_acceptable_error_percentage(50.0);

        let result = run_archival(Arc::new(PanicsOn("team-1")), options, 4).await;

        assert_eq!(result.status, ProcessStatus::CompletedWithErrors);
        assert_eq!(result.successes.len(), 3);
        assert!(result.skipped.is_empty());
        assert_eq!(result.errors.len(), 1);
        let error = &result.errors[0];
        assert_eq!(error.entity_id, "team-1");
        assert_eq!(error.error_code, "INTERNAL");
        assert!(!error.retryable);
        assert!(error.message.contains("processor bug on team-1"));
        assert_eq!(result.summary.succeeded + result.summary.failed, 4);
    }

    #[tokio::test]
    async fn test_panicking_item_stops_a_strict_run() {
        let options = BulkOperationOptions::default()
            .without_notifications()
            .with_batch_size(2)
            .with_max_concurrency(1)
            .with_continue_on_error(false);

        let result = run_archival(Arc::new(PanicsOn("team-0")), options, 4).await;

        assert_eq!(result.status, ProcessStatus::Failed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.skipped.len(), 2);
        assert_eq!(result.errors[0].error_code, "INTERNAL");
    }
}
