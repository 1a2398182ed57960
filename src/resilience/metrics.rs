//! # Circuit Breaker Metrics
//!
//! Per-breaker and system-wide metrics exposed for health checks.

use crate::resilience::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Metrics for a single circuit breaker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls admitted through the breaker
    pub total_calls: u64,

    pub success_count: u64,

    /// Calls that counted as breaker failures (transient errors)
    pub failure_count: u64,

    /// Calls short-circuited while open
    pub rejected_count: u64,

    /// Times the circuit transitioned to open
    pub times_opened: u64,

    /// Calls currently inside the rolling window
    pub window_calls: u64,

    /// Failures currently inside the rolling window
    pub window_failures: u64,

    pub total_duration: Duration,

    pub current_state: CircuitState,

    /// Lifetime failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            times_opened: 0,
            window_calls: 0,
            window_failures: 0,
            total_duration: Duration::ZERO,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            average_duration: Duration::ZERO,
        }
    }

    /// Failure ratio over the current rolling window
    pub fn window_failure_ratio(&self) -> f64 {
        if self.window_calls == 0 {
            return 0.0;
        }
        self.window_failures as f64 / self.window_calls as f64
    }

    pub fn is_healthy(&self) -> bool {
        match self.current_state {
            CircuitState::Closed => self.window_failure_ratio() < 0.1,
            CircuitState::Open => false,
            CircuitState::HalfOpen => true,
        }
    }

    pub fn state_description(&self) -> &'static str {
        match self.current_state {
            CircuitState::Closed => "Healthy - Normal operation",
            CircuitState::Open => "Failing - Rejecting all calls",
            CircuitState::HalfOpen => "Recovering - Admitting a single probe",
        }
    }

    /// Format metrics for logging
    pub fn format_summary(&self) -> String {
        format!(
            "State: {} | Calls: {} | Failures: {} | Rejected: {} | Window failure ratio: {:.1}% | Avg Duration: {}ms",
            self.state_description(),
            self.total_calls,
            self.failure_count,
            self.rejected_count,
            self.window_failure_ratio() * 100.0,
            self.average_duration.as_millis()
        )
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// System-wide circuit breaker metrics aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCircuitBreakerMetrics {
    pub circuit_breakers: HashMap<String, CircuitBreakerMetrics>,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

impl SystemCircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            circuit_breakers: HashMap::new(),
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn add_circuit_breaker(&mut self, name: String, metrics: CircuitBreakerMetrics) {
        self.circuit_breakers.insert(name, metrics);
        self.collected_at = chrono::Utc::now();
    }

    pub fn count_by_state(&self) -> HashMap<CircuitState, usize> {
        let mut counts = HashMap::new();
        for metrics in self.circuit_breakers.values() {
            *counts.entry(metrics.current_state).or_insert(0) += 1;
        }
        counts
    }

    pub fn unhealthy_circuits(&self) -> Vec<(&String, &CircuitBreakerMetrics)> {
        self.circuit_breakers
            .iter()
            .filter(|(_, metrics)| !metrics.is_healthy())
            .collect()
    }

    /// Share of healthy breakers (0.0 to 1.0); no breakers counts as healthy
    pub fn health_score(&self) -> f64 {
        if self.circuit_breakers.is_empty() {
            return 1.0;
        }

        let healthy_count = self
            .circuit_breakers
            .values()
            .filter(|metrics| metrics.is_healthy())
            .count();

        healthy_count as f64 / self.circuit_breakers.len() as f64
    }

    pub fn total_calls(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.total_calls).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.circuit_breakers.values().map(|m| m.failure_count).sum()
    }

    pub fn format_summary(&self) -> String {
        let state_counts = self.count_by_state();
        let count = |state| state_counts.get(&state).copied().unwrap_or(0);

        format!(
            "Circuit Breakers: {} total | {} closed | {} open | {} half-open | Health: {:.1}%",
            self.circuit_breakers.len(),
            count(CircuitState::Closed),
            count(CircuitState::Open),
            count(CircuitState::HalfOpen),
            self.health_score() * 100.0,
        )
    }
}

impl Default for SystemCircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_score() {
        let mut system = SystemCircuitBreakerMetrics::new();
        assert_eq!(system.health_score(), 1.0);

        system.add_circuit_breaker("directory".into(), CircuitBreakerMetrics::new());
        let mut open = CircuitBreakerMetrics::new();
        open.current_state = CircuitState::Open;
        system.add_circuit_breaker("external".into(), open);

        assert_eq!(system.health_score(), 0.5);
        assert_eq!(system.unhealthy_circuits().len(), 1);
        assert!(system.format_summary().contains("1 open"));
    }

    #[test]
    fn test_window_ratio() {
        let mut metrics = CircuitBreakerMetrics::new();
        assert_eq!(metrics.window_failure_ratio(), 0.0);
        metrics.window_calls = 10;
        metrics.window_failures = 4;
        assert!((metrics.window_failure_ratio() - 0.4).abs() < f64::EPSILON);
        assert!(!metrics.is_healthy());
    }
}
