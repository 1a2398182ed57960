//! # Teamforge Configuration System
//!
//! Typed configuration for the bulk directory-operations core. Values are
//! layered by [`ConfigManager`]: built-in defaults, an optional TOML file and
//! `TEAMFORGE_`-prefixed environment overrides (`__` separates nested keys,
//! e.g. `TEAMFORGE_BULK__DEFAULT_BATCH_SIZE=25`).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use teamforge_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let retry = manager.config().resilience.retry.to_retry_policy();
//! println!("max retries: {}", retry.max_retries);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::downstreams;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamforgeConfig {
    /// Deployment environment (test, development, production)
    pub environment: String,

    /// Directory session settings
    pub session: SessionConfig,

    /// Result cache TTLs and capacity
    pub cache: CacheConfig,

    /// Retry, timeout and circuit breaker settings
    pub resilience: ResilienceConfig,

    /// Default bulk run options
    pub bulk: BulkConfig,

    /// Process registry lifecycle
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Microsoft Graph base URL
    pub graph_base_url: String,
    /// Budget for establishing a session
    pub connect_timeout_seconds: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub user_ttl_seconds: u64,
    pub team_ttl_seconds: u64,
    pub member_list_ttl_seconds: u64,
    pub user_teams_ttl_seconds: u64,
    pub license_catalog_ttl_seconds: u64,
    pub user_licenses_ttl_seconds: u64,
    /// TTL for cached not-found results
    pub negative_ttl_seconds: u64,
    /// Upper bound on live entries; 0 disables the bound
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    /// Per-attempt budget for reads
    pub read_timeout_seconds: u64,
    /// Per-attempt budget for writes
    pub write_timeout_seconds: u64,
    pub circuit_breakers: CircuitBreakerConfig,
}

impl ResilienceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// Random extra delay as a fraction of the computed delay (0.0 - 1.0)
    pub jitter_factor: f64,
}

impl RetryConfig {
    /// Convert to resilience module's format
    pub fn to_retry_policy(&self) -> crate::resilience::RetryPolicy {
        crate::resilience::RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Circuit breaker configuration per logical downstream
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerConfig {
    /// Whether circuit breakers are enabled globally
    pub enabled: bool,

    /// Default configuration for downstreams without an explicit entry
    pub default_config: CircuitBreakerComponentConfig,

    /// Specific configurations for named downstreams
    pub component_configs: HashMap<String, CircuitBreakerComponentConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CircuitBreakerComponentConfig {
    /// Failure ratio (0.0 - 1.0) that opens the circuit
    pub failure_ratio: f64,
    /// Rolling window over which the ratio is computed
    pub sampling_window_seconds: u64,
    /// Calls required in the window before the ratio is evaluated
    pub minimum_throughput: u32,
    /// Time spent open before a probe is admitted
    pub break_duration_seconds: u64,
}

impl CircuitBreakerConfig {
    /// Get configuration for a specific downstream
    pub fn config_for_component(&self, component_name: &str) -> CircuitBreakerComponentConfig {
        self.component_configs
            .get(component_name)
            .cloned()
            .unwrap_or_else(|| self.default_config.clone())
    }
}

impl CircuitBreakerComponentConfig {
    /// Convert to resilience module's format
    pub fn to_resilience_config(&self) -> crate::resilience::CircuitBreakerConfig {
        crate::resilience::CircuitBreakerConfig {
            failure_ratio: self.failure_ratio,
            sampling_window: Duration::from_secs(self.sampling_window_seconds),
            minimum_throughput: self.minimum_throughput,
            break_duration: Duration::from_secs(self.break_duration_seconds),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BulkConfig {
    pub default_batch_size: usize,
    pub default_timeout_minutes: u64,
    pub default_max_concurrency: usize,
    pub default_continue_on_error: bool,
    pub default_acceptable_error_percentage: f64,
    /// Runs with at least this many items send an admin summary
    pub admin_summary_threshold: usize,
    /// Hard budget for each audit or notification call
    pub collaborator_timeout_seconds: u64,
}

impl BulkConfig {
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }

    pub fn default_options(&self) -> crate::orchestration::BulkOperationOptions {
        crate::orchestration::BulkOperationOptions {
            batch_size: self.default_batch_size,
            timeout_minutes: self.default_timeout_minutes,
            max_concurrency: self.default_max_concurrency,
            continue_on_error: self.default_continue_on_error,
            acceptable_error_percentage: self.default_acceptable_error_percentage,
            dry_run: false,
            notify_admins: true,
            notify_user: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// How long finished runs stay pollable
    pub retention_minutes: u64,
    pub sweep_interval_seconds: u64,
}

impl RegistryConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for TeamforgeConfig {
    fn default() -> Self {
        let mut component_configs = HashMap::new();
        component_configs.insert(
            downstreams::DIRECTORY.to_string(),
            CircuitBreakerComponentConfig {
                failure_ratio: 0.5,
                sampling_window_seconds: 30,
                minimum_throughput: 10,
                break_duration_seconds: 60,
            },
        );
        component_configs.insert(
            downstreams::EXTERNAL.to_string(),
            CircuitBreakerComponentConfig {
                failure_ratio: 0.7,
                sampling_window_seconds: 60,
                minimum_throughput: 20,
                break_duration_seconds: 30,
            },
        );

        Self {
            environment: "development".to_string(),
            session: SessionConfig {
                graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
                connect_timeout_seconds: 30,
                user_agent: format!("teamforge-core/{}", env!("CARGO_PKG_VERSION")),
            },
            cache: CacheConfig {
                user_ttl_seconds: 15 * 60,
                team_ttl_seconds: 15 * 60,
                member_list_ttl_seconds: 5 * 60,
                user_teams_ttl_seconds: 5 * 60,
                license_catalog_ttl_seconds: 60 * 60,
                user_licenses_ttl_seconds: 15 * 60,
                negative_ttl_seconds: 60,
                max_entries: 50_000,
            },
            resilience: ResilienceConfig {
                retry: RetryConfig {
                    max_retries: 3,
                    base_delay_ms: 2_000,
                    max_delay_ms: 30_000,
                    backoff_multiplier: 2.0,
                    jitter_factor: 0.2,
                },
                read_timeout_seconds: 30,
                write_timeout_seconds: 60,
                circuit_breakers: CircuitBreakerConfig {
                    enabled: true,
                    default_config: CircuitBreakerComponentConfig {
                        failure_ratio: 0.5,
                        sampling_window_seconds: 30,
                        minimum_throughput: 10,
                        break_duration_seconds: 60,
                    },
                    component_configs,
                },
            },
            bulk: BulkConfig {
                default_batch_size: 50,
                default_timeout_minutes: 60,
                default_max_concurrency: 5,
                default_continue_on_error: true,
                default_acceptable_error_percentage: 10.0,
                admin_summary_threshold: 50,
                collaborator_timeout_seconds: 30,
            },
            registry: RegistryConfig {
                retention_minutes: 30,
                sweep_interval_seconds: 60,
            },
        }
    }
}

impl TeamforgeConfig {
    /// Validate all sections, returning the first actionable problem
    pub fn validate(&self) -> ConfigResult<()> {
        if !matches!(
            self.environment.as_str(),
            "test" | "development" | "production"
        ) {
            return Err(ConfigurationError::invalid_value(
                "environment",
                &self.environment,
                "expected one of test, development, production",
            ));
        }

        if !self.session.graph_base_url.starts_with("http") {
            return Err(ConfigurationError::invalid_value(
                "session.graph_base_url",
                &self.session.graph_base_url,
                "must be an http(s) URL",
            ));
        }
        if self.session.connect_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "session.connect_timeout_seconds",
                0,
                "must be greater than 0",
            ));
        }

        let ttls = [
            ("cache.user_ttl_seconds", self.cache.user_ttl_seconds),
            ("cache.team_ttl_seconds", self.cache.team_ttl_seconds),
            ("cache.member_list_ttl_seconds", self.cache.member_list_ttl_seconds),
            ("cache.user_teams_ttl_seconds", self.cache.user_teams_ttl_seconds),
            (
                "cache.license_catalog_ttl_seconds",
                self.cache.license_catalog_ttl_seconds,
            ),
            (
                "cache.user_licenses_ttl_seconds",
                self.cache.user_licenses_ttl_seconds,
            ),
            ("cache.negative_ttl_seconds", self.cache.negative_ttl_seconds),
        ];
        for (field, ttl) in ttls {
            if ttl == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    ttl,
                    "TTL must be greater than 0",
                ));
            }
        }

        let retry = &self.resilience.retry;
        if retry.max_retries > 10 {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.max_retries",
                retry.max_retries,
                "should not exceed 10",
            ));
        }
        if !(1.0..=10.0).contains(&retry.backoff_multiplier) {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.backoff_multiplier",
                retry.backoff_multiplier,
                "must be within 1.0 and 10.0",
            ));
        }
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "resilience.retry.jitter_factor",
                retry.jitter_factor,
                "must be within 0.0 and 1.0",
            ));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            return Err(ConfigurationError::validation_error(
                "resilience.retry.max_delay_ms must not be lower than base_delay_ms",
            ));
        }
        if self.resilience.read_timeout_seconds == 0 || self.resilience.write_timeout_seconds == 0
        {
            return Err(ConfigurationError::validation_error(
                "resilience call timeouts must be greater than 0",
            ));
        }

        let breakers = &self.resilience.circuit_breakers;
        std::iter::once(("default", &breakers.default_config))
            .chain(
                breakers
                    .component_configs
                    .iter()
                    .map(|(name, cfg)| (name.as_str(), cfg)),
            )
            .try_for_each(|(name, cfg)| {
                cfg.to_resilience_config().validate().map_err(|reason| {
                    ConfigurationError::invalid_value(
                        format!("resilience.circuit_breakers.{name}"),
                        format!("{cfg:?}"),
                        reason,
                    )
                })
            })?;

        self.bulk
            .default_options()
            .validate()
            .map_err(|e| ConfigurationError::validation_error(format!("bulk defaults: {e}")))?;

        if self.bulk.collaborator_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "bulk.collaborator_timeout_seconds",
                0,
                "must be greater than 0",
            ));
        }

        if self.registry.sweep_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "registry.sweep_interval_seconds",
                0,
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    pub fn is_test_environment(&self) -> bool {
        self.environment == "test"
    }

    pub fn is_production_environment(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TeamforgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.negative_ttl_seconds, 60);
        assert_eq!(config.resilience.retry.max_retries, 3);
    }

    #[test]
    fn test_component_lookup_falls_back_to_default() {
        let config = TeamforgeConfig::default();
        let breakers = &config.resilience.circuit_breakers;

        let external = breakers.config_for_component(downstreams::EXTERNAL);
        assert_eq!(external.minimum_throughput, 20);

        let unknown = breakers.config_for_component("unknown");
        assert_eq!(unknown.minimum_throughput, 10);
        assert_eq!(unknown.break_duration_seconds, 60);
    }

    #[test]
    fn test_invalid_environment_rejected() {
        let config = TeamforgeConfig {
            environment: "staging".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut config = TeamforgeConfig::default();
        config.cache.negative_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_breaker_ratio_rejected() {
        let mut config = TeamforgeConfig::default();
        config.resilience.circuit_breakers.default_config.failure_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bulk_defaults_rejected() {
        let mut config = TeamforgeConfig::default();
        config.bulk.default_batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = TeamforgeConfig::default();
        config.bulk.collaborator_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_multiplier_is_bounded() {
        let mut config = TeamforgeConfig::default();
        config.resilience.retry.backoff_multiplier = 1e300;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        config.resilience.retry.backoff_multiplier = 10.0;
        assert!(config.validate().is_ok());
    }
}
