//! # Circuit Breaker Implementation
//!
//! Failure-ratio circuit breaker with three states: Closed (normal
//! operation), Open (failing fast) and Half-Open (admitting exactly one
//! probe). The rolling window of outcomes is updated atomically per call
//! under a single lock; state reads are lock-free.

use crate::clock::{system_clock, SharedClock};
use crate::constants::events;
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerMetrics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - a single probe is allowed through
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),

    /// Circuit breaker configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

#[derive(Debug)]
struct BreakerWindow {
    /// (completed_at, failed)
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    metrics: CircuitBreakerMetrics,
}

/// Admission ticket for one call; a dropped, unrecorded probe frees the slot
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self, duration: Duration) {
        self.settled = true;
        self.breaker.record(self.probe, false, duration);
    }

    pub fn record_failure(mut self, duration: Duration) {
        self.settled = true;
        self.breaker.record(self.probe, true, duration);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe();
        }
    }
}

/// Core circuit breaker implementation with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    clock: SharedClock,
    window: Mutex<BreakerWindow>,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, system_clock())
    }

    pub fn with_clock(name: String, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        info!(
            component = %name,
            failure_ratio = config.failure_ratio,
            minimum_throughput = config.minimum_throughput,
            sampling_window_seconds = config.sampling_window.as_secs(),
            break_duration_seconds = config.break_duration.as_secs(),
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            clock,
            window: Mutex::new(BreakerWindow {
                outcomes: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation; every error counts as a failure
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(operation, |_| true).await
    }

    /// Execute an operation; only errors for which `is_failure` holds count
    /// against the window; the rest are treated as healthy responses
    pub async fn call_classified<F, T, E, Fut, C>(
        &self,
        operation: F,
        is_failure: C,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.try_acquire().ok_or_else(|| CircuitBreakerError::CircuitOpen {
            component: self.name.clone(),
        })?;

        let started = self.clock.now();
        let result = operation().await;
        let duration = self.clock.now().saturating_duration_since(started);

        match &result {
            Err(error) if is_failure(error) => permit.record_failure(duration),
            _ => permit.record_success(duration),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Admit a call, or `None` when the circuit short-circuits it
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let now = self.clock.now();
        let mut window = self.window.lock();

        let probe = match self.state() {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = window
                    .opened_at
                    .map(|opened| now.saturating_duration_since(opened))
                    .unwrap_or(self.config.break_duration);
                if elapsed < self.config.break_duration {
                    window.metrics.rejected_count += 1;
                    return None;
                }
                self.state
                    .store(CircuitState::HalfOpen as u8, Ordering::Release);
                info!(component = %self.name, "Circuit breaker half-open (admitting probe)");
                window.probe_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if window.probe_in_flight {
                    window.metrics.rejected_count += 1;
                    return None;
                }
                window.probe_in_flight = true;
                true
            }
        };

        Some(CallPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn record(&self, probe: bool, failed: bool, duration: Duration) {
        let now = self.clock.now();
        let mut window = self.window.lock();

        window.metrics.total_calls += 1;
        window.metrics.total_duration += duration;
        if failed {
            window.metrics.failure_count += 1;
        } else {
            window.metrics.success_count += 1;
        }

        if probe {
            window.probe_in_flight = false;
            if failed {
                self.open(&mut window, now);
            } else {
                self.close(&mut window);
            }
            return;
        }

        if self.state() != CircuitState::Closed {
            // Outcome of a call admitted before the circuit opened
            return;
        }

        window.outcomes.push_back((now, failed));
        self.prune(&mut window, now);

        let calls = window.outcomes.len();
        let failures = window.outcomes.iter().filter(|(_, failed)| *failed).count();
        if calls >= self.config.minimum_throughput as usize
            && failures as f64 / calls as f64 >= self.config.failure_ratio
        {
            self.open(&mut window, now);
        } else if failed {
            debug!(
                component = %self.name,
                window_calls = calls,
                window_failures = failures,
                "Circuit breaker recorded failure"
            );
        }
    }

    fn release_probe(&self) {
        let mut window = self.window.lock();
        window.probe_in_flight = false;
        debug!(component = %self.name, "Unsettled probe released");
    }

    fn prune(&self, window: &mut BreakerWindow, now: Instant) {
        while let Some((at, _)) = window.outcomes.front() {
            if now.saturating_duration_since(*at) > self.config.sampling_window {
                window.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn open(&self, window: &mut BreakerWindow, now: Instant) {
        let failures = window.outcomes.iter().filter(|(_, failed)| *failed).count();
        let calls = window.outcomes.len();
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        window.opened_at = Some(now);
        window.outcomes.clear();
        window.metrics.times_opened += 1;

        warn!(
            event = events::CIRCUIT_OPENED,
            component = %self.name,
            window_calls = calls,
            window_failures = failures,
            break_duration_seconds = self.config.break_duration.as_secs(),
            "Circuit breaker opened (failing fast)"
        );
    }

    fn close(&self, window: &mut BreakerWindow) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        window.opened_at = None;
        window.outcomes.clear();

        info!(
            event = events::CIRCUIT_CLOSED,
            component = %self.name,
            total_calls = window.metrics.total_calls,
            "Circuit breaker closed (recovered)"
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.probe_in_flight = false;
        self.open(&mut window, now);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        let mut window = self.window.lock();
        window.probe_in_flight = false;
        self.close(&mut window);
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let now = self.clock.now();
        let mut window = self.window.lock();
        self.prune(&mut window, now);

        let mut snapshot = window.metrics.clone();
        snapshot.current_state = self.state();
        snapshot.window_calls = window.outcomes.len() as u64;
        snapshot.window_failures = window.outcomes.iter().filter(|(_, f)| *f).count() as u64;
        if snapshot.total_calls > 0 {
            snapshot.failure_rate = snapshot.failure_count as f64 / snapshot.total_calls as f64;
            snapshot.average_duration = snapshot.total_duration / snapshot.total_calls as u32;
        }
        snapshot
    }

    pub fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }
}
