//! # Circuit Breaker Configuration
//!
//! Configuration for a single circuit breaker. Per-downstream values are
//! loaded through `crate::config::CircuitBreakerConfig` and converted here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure ratio (0.0 - 1.0) over the sampling window that opens the circuit
    pub failure_ratio: f64,

    /// Rolling window of call outcomes considered for the ratio
    pub sampling_window: Duration,

    /// Calls required in the window before the ratio is evaluated
    pub minimum_throughput: u32,

    /// Time spent open before a single probe is admitted
    pub break_duration: Duration,
}

impl CircuitBreakerConfig {
    /// Primary directory API
    pub fn for_directory() -> Self {
        Self {
            failure_ratio: 0.5,
            sampling_window: Duration::from_secs(30),
            minimum_throughput: 10,
            break_duration: Duration::from_secs(60),
        }
    }

    /// Looser breaker for secondary integrations
    pub fn for_external_api() -> Self {
        Self {
            failure_ratio: 0.7,
            sampling_window: Duration::from_secs(60),
            minimum_throughput: 20,
            break_duration: Duration::from_secs(30),
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err("failure_ratio must be within (0.0, 1.0]".to_string());
        }

        if self.sampling_window.is_zero() {
            return Err("sampling_window must be greater than 0".to_string());
        }

        if self.minimum_throughput == 0 {
            return Err("minimum_throughput must be greater than 0".to_string());
        }

        if self.break_duration.is_zero() {
            return Err("break_duration must be greater than 0".to_string());
        }

        if self.break_duration > Duration::from_secs(600) {
            return Err("break_duration should not exceed 600 seconds".to_string());
        }

        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::for_directory()
    }
}
