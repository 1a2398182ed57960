//! Terminal artifact of a bulk run

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::process::{failure_percentage, ProcessStatus};
use crate::error::DirectoryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSuccess {
    pub entity_id: String,
    pub operation: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub entity_id: String,
    pub operation: String,
    pub message: String,
    /// Whether resubmitting the item later may succeed
    pub retryable: bool,
    pub error_code: String,
}

impl ItemError {
    pub fn from_directory(entity_id: &str, operation: &str, error: &DirectoryError) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            operation: operation.to_string(),
            message: error.to_string(),
            retryable: error.is_transient()
                || matches!(
                    error,
                    DirectoryError::CircuitOpen { .. } | DirectoryError::ConnectionNotReady(_)
                ),
            error_code: error.error_code().to_string(),
        }
    }

    /// The item's processing died without producing a directory outcome
    pub fn internal(entity_id: &str, operation: &str, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            operation: operation.to_string(),
            message: message.into(),
            retryable: false,
            error_code: "INTERNAL".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub entity_id: String,
    pub operation: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRateSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failure_percentage: f64,
}

impl ErrorRateSummary {
    pub fn new(total: usize, succeeded: usize, failed: usize, skipped: usize) -> Self {
        Self {
            total,
            succeeded,
            failed,
            skipped,
            failure_percentage: failure_percentage(failed, total),
        }
    }
}

/// Outcome of every submitted item, produced once when the run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOperationResult {
    pub process_id: Uuid,
    pub operation_type: String,
    pub status: ProcessStatus,
    pub success: bool,
    pub successes: Vec<ItemSuccess>,
    pub errors: Vec<ItemError>,
    pub skipped: Vec<SkippedItem>,
    pub summary: ErrorRateSummary,
    pub dry_run: bool,
    pub duration_ms: u64,
    /// Run-level failure (timeout, stop rule)
    pub error_message: Option<String>,
}

impl BulkOperationResult {
    /// Every submitted item has exactly one outcome
    pub fn outcome_count(&self) -> usize {
        self.successes.len() + self.errors.len() + self.skipped.len()
    }

    pub fn error_for(&self, entity_id: &str) -> Option<&ItemError> {
        self.errors.iter().find(|e| e.entity_id == entity_id)
    }

    pub fn success_for(&self, entity_id: &str) -> Option<&ItemSuccess> {
        self.successes.iter().find(|s| s.entity_id == entity_id)
    }

    pub fn is_skipped(&self, entity_id: &str) -> bool {
        self.skipped.iter().any(|s| s.entity_id == entity_id)
    }
}
