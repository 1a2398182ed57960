//! Bulk run state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a bulk run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Registered, not yet scheduling batches
    Pending,
    Running,
    /// Every item succeeded
    Completed,
    /// Some items failed, within the acceptable error percentage
    CompletedWithErrors,
    /// Stopped on error, over the error threshold, or timed out
    Failed,
    Cancelled,
}

impl ProcessStatus {
    /// No further transitions once terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Failed | Self::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ProcessStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "completed_with_errors" => Ok(Self::CompletedWithErrors),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid process status: {s}")),
        }
    }
}

/// Snapshot of one bulk run as tracked by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub process_id: Uuid,
    pub operation_type: String,
    pub initiated_by: String,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items: usize,
    /// Successful items
    pub processed_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    pub current_operation: Option<String>,
    pub cancellation_requested: bool,
    /// Entities touched by successful items
    pub affected_entities: Vec<String>,
    pub error_message: Option<String>,
    pub dry_run: bool,
}

impl BatchRun {
    pub fn new(
        operation_type: impl Into<String>,
        initiated_by: impl Into<String>,
        total_items: usize,
        dry_run: bool,
    ) -> Self {
        Self {
            process_id: Uuid::new_v4(),
            operation_type: operation_type.into(),
            initiated_by: initiated_by.into(),
            status: ProcessStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            total_items,
            processed_items: 0,
            failed_items: 0,
            skipped_items: 0,
            current_operation: None,
            cancellation_requested: false,
            affected_entities: Vec::new(),
            error_message: None,
            dry_run,
        }
    }

    /// Items with a recorded outcome
    pub fn completed_items(&self) -> usize {
        self.processed_items + self.failed_items
    }

    pub fn progress_percentage(&self) -> f64 {
        if self.total_items == 0 {
            return 100.0;
        }
        self.completed_items() as f64 / self.total_items as f64 * 100.0
    }

    /// Cumulative failures over all submitted items
    pub fn failure_percentage(&self) -> f64 {
        failure_percentage(self.failed_items, self.total_items)
    }
}

pub(crate) fn failure_percentage(failed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    failed as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminality() {
        for status in [
            ProcessStatus::Pending,
            ProcessStatus::Running,
            ProcessStatus::Completed,
            ProcessStatus::CompletedWithErrors,
            ProcessStatus::Failed,
            ProcessStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<ProcessStatus>(), Ok(status));
            assert_eq!(status.is_terminal(), !status.is_active());
        }
        assert!("done".parse::<ProcessStatus>().is_err());
    }

    #[test]
    fn test_percentages() {
        let mut run = BatchRun::new("bulk_onboarding", "admin@school.edu", 8, false);
        run.processed_items = 4;
        run.failed_items = 2;
        assert_eq!(run.progress_percentage(), 75.0);
        assert_eq!(run.failure_percentage(), 25.0);

        let empty = BatchRun::new("bulk_onboarding", "admin@school.edu", 0, false);
        assert_eq!(empty.failure_percentage(), 0.0);
        assert_eq!(empty.progress_percentage(), 100.0);
    }
}
