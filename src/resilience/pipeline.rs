//! # Resilient Executor
//!
//! Composes retry (outermost), the downstream's circuit breaker and a
//! per-attempt timeout around a single outbound call. A circuit-open
//! rejection is never retried; only transient failures of retryable call
//! classes consume retry budget.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ResilienceConfig;
use crate::constants::downstreams;
use crate::error::{DirectoryError, DirectoryResult};
use crate::logging::log_directory_call;
use crate::resilience::{CircuitBreakerError, CircuitBreakerManager, RetryPolicy};
use crate::session::{DirectoryCommand, SessionManager};

/// Retry eligibility and timeout budget of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallClass {
    Read,
    /// Keyed by a natural key or setting an absolute value; safe to replay
    IdempotentWrite,
    /// Replaying could duplicate the effect
    NonIdempotentWrite,
}

impl CallClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NonIdempotentWrite)
    }
}

/// Retry + circuit breaker + timeout around directory calls
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    breakers: Arc<CircuitBreakerManager>,
    policy: RetryPolicy,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ResilientExecutor {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        policy: RetryPolicy,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            breakers,
            policy,
            read_timeout,
            write_timeout,
        }
    }

    pub fn from_config(config: &ResilienceConfig, breakers: Arc<CircuitBreakerManager>) -> Self {
        Self::new(
            breakers,
            config.retry.to_retry_policy(),
            config.read_timeout(),
            config.write_timeout(),
        )
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn timeout_for(&self, class: CallClass) -> Duration {
        match class {
            CallClass::Read => self.read_timeout,
            CallClass::IdempotentWrite | CallClass::NonIdempotentWrite => self.write_timeout,
        }
    }

    /// Run a directory command through the session on the primary downstream
    pub async fn run_command(
        &self,
        session: &SessionManager,
        command: &DirectoryCommand,
    ) -> DirectoryResult<serde_json::Value> {
        if !session.is_ready() {
            return Err(DirectoryError::ConnectionNotReady(format!(
                "no live session for {}",
                command.operation_name()
            )));
        }

        self.execute(
            downstreams::DIRECTORY,
            command.operation_name(),
            command.call_class(),
            || session.run(command),
        )
        .await
    }

    /// Execute `call` with retry, circuit breaking and per-attempt timeout
    pub async fn execute<T, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        class: CallClass,
        mut call: F,
    ) -> DirectoryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        let breaker = self
            .breakers
            .is_enabled()
            .then(|| self.breakers.get_circuit_breaker(component));
        let timeout = self.timeout_for(class);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let started = Instant::now();
            let attempt_future = call();
            let timed = async move {
                match tokio::time::timeout(timeout, attempt_future).await {
                    Ok(result) => result,
                    Err(_) => Err(DirectoryError::Timeout {
                        operation: operation.to_string(),
                        timeout,
                    }),
                }
            };

            let result = match &breaker {
                Some(breaker) => breaker
                    .call_classified(|| timed, DirectoryError::counts_as_breaker_failure)
                    .await
                    .map_err(|error| match error {
                        CircuitBreakerError::CircuitOpen { component } => {
                            DirectoryError::CircuitOpen { component }
                        }
                        CircuitBreakerError::OperationFailed(inner) => inner,
                        CircuitBreakerError::ConfigurationError(message) => {
                            DirectoryError::permanent(operation, message)
                        }
                    }),
                None => timed.await,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    log_directory_call(operation, component, attempt, "success", Some(elapsed_ms));
                    return Ok(value);
                }
                Err(error)
                    if error.is_transient()
                        && class.is_retryable()
                        && attempt <= self.policy.max_retries =>
                {
                    let delay = self.policy.delay_for_retry(attempt, error.retry_after());
                    warn!(
                        operation = operation,
                        component = component,
                        attempt = attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient directory failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    if error.is_expected_backpressure() {
                        debug!(operation = operation, component = component, "Call short-circuited");
                    } else if error.is_transient() {
                        warn!(
                            operation = operation,
                            component = component,
                            attempts = attempt,
                            error = %error,
                            "Directory call failed after retries"
                        );
                    }
                    log_directory_call(operation, component, attempt, error.error_code(), Some(elapsed_ms));
                    return Err(error);
                }
            }
        }
    }
}
