//! # Outbound Collaborators
//!
//! Narrow contracts for the audit trail, user progress notifications and
//! admin summaries. The defaults only log through `tracing`; hosts plug in
//! their persistence and push transports.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::process::BatchRun;
use super::result::BulkOperationResult;
use crate::error::DirectoryResult;

/// Audit entry per bulk run
#[async_trait]
pub trait OperationHistory: Send + Sync {
    async fn record_started(&self, run: &BatchRun) -> DirectoryResult<()>;

    async fn record_finished(&self, run: &BatchRun, result: &BulkOperationResult)
        -> DirectoryResult<()>;
}

/// Push notifications to the initiating user
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn progress(&self, user: &str, run: &BatchRun) -> DirectoryResult<()>;

    async fn completed(&self, user: &str, result: &BulkOperationResult) -> DirectoryResult<()>;
}

/// Summary e-mail to administrators for large runs
#[async_trait]
pub trait AdminNotifier: Send + Sync {
    async fn bulk_summary(&self, initiated_by: &str, result: &BulkOperationResult)
        -> DirectoryResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingOperationHistory;

#[async_trait]
impl OperationHistory for TracingOperationHistory {
    async fn record_started(&self, run: &BatchRun) -> DirectoryResult<()> {
        info!(
            process_id = %run.process_id,
            operation = %run.operation_type,
            initiated_by = %run.initiated_by,
            total_items = run.total_items,
            dry_run = run.dry_run,
            "HISTORY started"
        );
        Ok(())
    }

    async fn record_finished(
        &self,
        run: &BatchRun,
        result: &BulkOperationResult,
    ) -> DirectoryResult<()> {
        info!(
            process_id = %run.process_id,
            operation = %run.operation_type,
            status = %result.status,
            succeeded = result.summary.succeeded,
            failed = result.summary.failed,
            skipped = result.summary.skipped,
            "HISTORY finished"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressNotifier;

#[async_trait]
impl ProgressNotifier for TracingProgressNotifier {
    async fn progress(&self, user: &str, run: &BatchRun) -> DirectoryResult<()> {
        info!(
            user = %user,
            process_id = %run.process_id,
            progress_percentage = run.progress_percentage(),
            current_operation = run.current_operation.as_deref(),
            "PROGRESS"
        );
        Ok(())
    }

    async fn completed(&self, user: &str, result: &BulkOperationResult) -> DirectoryResult<()> {
        info!(
            user = %user,
            process_id = %result.process_id,
            status = %result.status,
            "PROGRESS completed"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAdminNotifier;

#[async_trait]
impl AdminNotifier for TracingAdminNotifier {
    async fn bulk_summary(
        &self,
        initiated_by: &str,
        result: &BulkOperationResult,
    ) -> DirectoryResult<()> {
        info!(
            initiated_by = %initiated_by,
            process_id = %result.process_id,
            operation = %result.operation_type,
            total = result.summary.total,
            failed = result.summary.failed,
            failure_percentage = result.summary.failure_percentage,
            "ADMIN summary"
        );
        Ok(())
    }
}

/// The collaborators one orchestrator reports to
#[derive(Clone)]
pub struct Collaborators {
    pub history: Arc<dyn OperationHistory>,
    pub progress: Arc<dyn ProgressNotifier>,
    pub admin: Arc<dyn AdminNotifier>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            history: Arc::new(TracingOperationHistory),
            progress: Arc::new(TracingProgressNotifier),
            admin: Arc::new(TracingAdminNotifier),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
