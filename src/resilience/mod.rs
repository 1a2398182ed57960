//! # Resilience Module
//!
//! Fault tolerance for outbound directory calls.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: one per logical downstream, opened on a failure
//!   ratio over a rolling window, probing recovery with a single call
//! - **Retry Policy**: exponential backoff with jitter honouring `Retry-After`
//! - **Resilient Executor**: retry → circuit breaker → per-attempt timeout
//! - **Metrics**: per-breaker and system-wide health for monitoring
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use teamforge_core::config::TeamforgeConfig;
//! use teamforge_core::error::DirectoryError;
//! use teamforge_core::resilience::{CallClass, CircuitBreakerManager, ResilientExecutor};
//!
//! # async fn example() -> Result<(), DirectoryError> {
//! let config = TeamforgeConfig::default();
//! let breakers = Arc::new(CircuitBreakerManager::from_config(
//!     &config.resilience.circuit_breakers,
//! ));
//! let executor = ResilientExecutor::from_config(&config.resilience, breakers);
//!
//! let value = executor
//!     .execute("directory", "get_user", CallClass::Read, || async {
//!         Ok::<_, DirectoryError>(42)
//!     })
//!     .await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod pipeline;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerError, CircuitState};
pub use config::CircuitBreakerConfig;
pub use manager::CircuitBreakerManager;
pub use metrics::{CircuitBreakerMetrics, SystemCircuitBreakerMetrics};
pub use pipeline::{CallClass, ResilientExecutor};
pub use retry::RetryPolicy;
