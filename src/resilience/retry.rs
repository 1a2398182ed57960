//! # Retry Policy
//!
//! Exponential backoff with jitter for transient directory failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Random extra delay as a fraction of the computed delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, never retried
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retries with no delay, for tests and local tooling
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `retry` (1-based)
    ///
    /// A server-provided `Retry-After` wins when it is longer than the
    /// computed backoff.
    pub fn delay_for_retry(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let mut seconds =
            self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        if self.jitter_factor > 0.0 {
            seconds *= 1.0 + fastrand::f64() * self.jitter_factor;
        }

        // Capped in f64 so an overflowing exponential never reaches Duration
        let cap = self.max_delay.as_secs_f64();
        let backoff = if seconds.is_finite() && seconds < cap {
            Duration::from_secs_f64(seconds.max(0.0))
        } else if self.base_delay.is_zero() {
            Duration::ZERO
        } else {
            self.max_delay
        };
        match retry_after {
            Some(server_delay) if server_delay > backoff => server_delay,
            _ => backoff,
        }
    }
}
