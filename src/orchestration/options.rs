//! Per-run options for bulk operations

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrchestrationError, OrchestrationResult};

/// Tuning knobs for one bulk run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkOperationOptions {
    /// Items per batch
    pub batch_size: usize,
    /// Wall-clock budget for the whole run
    pub timeout_minutes: u64,
    /// Concurrent batches, and the run-wide cap on in-flight item calls
    pub max_concurrency: usize,
    pub continue_on_error: bool,
    /// Cumulative failure percentage tolerated before the run is stopped
    pub acceptable_error_percentage: f64,
    /// Resolve and validate only; no mutating command is issued
    pub dry_run: bool,
    pub notify_admins: bool,
    pub notify_user: bool,
}

impl Default for BulkOperationOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            timeout_minutes: 60,
            max_concurrency: 5,
            continue_on_error: true,
            acceptable_error_percentage: 10.0,
            dry_run: false,
            notify_admins: true,
            notify_user: true,
        }
    }
}

impl BulkOperationOptions {
    pub fn validate(&self) -> OrchestrationResult<()> {
        if self.batch_size == 0 {
            return Err(OrchestrationError::InvalidOptions(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.timeout_minutes == 0 {
            return Err(OrchestrationError::InvalidOptions(
                "timeout_minutes must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(OrchestrationError::InvalidOptions(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.acceptable_error_percentage) {
            return Err(OrchestrationError::InvalidOptions(format!(
                "acceptable_error_percentage must be within [0, 100], got {}",
                self.acceptable_error_percentage
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_acceptable_error_percentage(mut self, percentage: f64) -> Self {
        self.acceptable_error_percentage = percentage;
        self
    }

    pub fn with_timeout_minutes(mut self, minutes: u64) -> Self {
        self.timeout_minutes = minutes;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.notify_admins = false;
        self.notify_user = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_are_valid() {
        let options = BulkOperationOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let base = BulkOperationOptions::default();
        for options in [
            base.clone().with_batch_size(0),
            base.clone().with_timeout_minutes(0),
            base.clone().with_max_concurrency(0),
            base.clone().with_acceptable_error_percentage(100.5),
            base.clone().with_acceptable_error_percentage(-1.0),
            base.clone().with_acceptable_error_percentage(f64::NAN),
        ] {
            assert!(matches!(
                options.validate(),
                Err(OrchestrationError::InvalidOptions(_))
            ));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: BulkOperationOptions =
            serde_json::from_str(r#"{"batch_size": 10, "dry_run": true}"#).unwrap();
        assert_eq!(options.batch_size, 10);
        assert!(options.dry_run);
        assert_eq!(options.max_concurrency, 5);
    }

    proptest! {
        #[test]
        fn validation_matches_bounds(
            batch_size in 0usize..200,
            timeout_minutes in 0u64..240,
            max_concurrency in 0usize..32,
            percentage in -50.0f64..150.0,
        ) {
            let options = BulkOperationOptions {
                batch_size,
                timeout_minutes,
                max_concurrency,
                acceptable_error_percentage: percentage,
                ..Default::default()
            };
            let expected = batch_size >= 1
                && timeout_minutes >= 1
                && max_concurrency >= 1
                && (0.0..=100.0).contains(&percentage);
            prop_assert_eq!(options.validate().is_ok(), expected);
        }
    }
}
