//! # Configuration Loader
//!
//! Layers built-in defaults, an optional TOML file and environment overrides
//! into a validated [`TeamforgeConfig`].

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{Config, Environment, File, FileFormat};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::TeamforgeConfig;

/// Environment variable naming the TOML file to load
pub const CONFIG_PATH_ENV: &str = "TEAMFORGE_CONFIG_PATH";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "TEAMFORGE";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: TeamforgeConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load using `TEAMFORGE_CONFIG_PATH` (when set) and environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let path = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from_file(path.as_deref())
    }

    /// Load from an explicit file (or defaults only) with environment overrides
    pub fn load_from_file(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Load with a custom environment prefix
    pub fn load_with_env_prefix(
        path: Option<&Path>,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config = Self::build(path, env_prefix)?;
        let manager = Self::from_config(config, path.map(Path::to_path_buf))?;

        info!(
            environment = %manager.environment,
            source_file = ?manager.source_file,
            "Configuration loaded"
        );
        debug!(
            config = %manager.debug_config(),
            "Effective configuration (sanitized)"
        );

        Ok(manager)
    }

    /// Wrap an already-built configuration after validating it
    pub fn from_config(
        config: TeamforgeConfig,
        source_file: Option<PathBuf>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            source_file,
        }))
    }

    fn build(path: Option<&Path>, env_prefix: &str) -> ConfigResult<TeamforgeConfig> {
        let defaults = Config::try_from(&TeamforgeConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigurationError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|layered| layered.try_deserialize::<TeamforgeConfig>())
            .map_err(|e| {
                let source_name = path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults".to_string());
                ConfigurationError::load_error(source_name, e)
            })
    }

    pub fn config(&self) -> &TeamforgeConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn sanitize_config_for_logging(config: &TeamforgeConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "token", "credential", "auth"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive {
                        *val = match val {
                            serde_json::Value::String(s) if s.is_empty() => {
                                serde_json::Value::String("[EMPTY]".to_string())
                            }
                            serde_json::Value::String(s) if s.chars().count() > 4 => {
                                let head: String = s.chars().take(2).collect();
                                let tail: String = s
                                    .chars()
                                    .rev()
                                    .take(2)
                                    .collect::<Vec<_>>()
                                    .into_iter()
                                    .rev()
                                    .collect();
                                serde_json::Value::String(format!("[MASKED: {head}***{tail}]"))
                            }
                            _ => serde_json::Value::String("[MASKED]".to_string()),
                        };
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_toml(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_defaults_only() {
        let manager =
            ConfigManager::load_with_env_prefix(None, "TEAMFORGE_TEST_DEFAULTS").unwrap();
        assert_eq!(manager.environment(), "development");
        assert_eq!(manager.config().bulk.default_batch_size, 50);
        assert!(manager.source_file().is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_toml(
            r#"
environment = "test"

[bulk]
default_batch_size = 20
default_max_concurrency = 2

[cache]
negative_ttl_seconds = 30
"#,
        );

        let manager =
            ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_TEST_FILE").unwrap();
        let config = manager.config();
        assert!(config.is_test_environment());
        assert_eq!(config.bulk.default_batch_size, 20);
        assert_eq!(config.bulk.default_max_concurrency, 2);
        assert_eq!(config.cache.negative_ttl_seconds, 30);
        // untouched values keep their defaults
        assert_eq!(config.cache.user_ttl_seconds, 900);
        assert_eq!(config.resilience.retry.max_retries, 3);
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_toml("[bulk]\ndefault_batch_size = 20\n");
        env::set_var("TEAMFORGE_TEST_ENVOVR_BULK__DEFAULT_BATCH_SIZE", "7");

        let manager =
            ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_TEST_ENVOVR")
                .unwrap();
        env::remove_var("TEAMFORGE_TEST_ENVOVR_BULK__DEFAULT_BATCH_SIZE");

        assert_eq!(manager.config().bulk.default_batch_size, 7);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = ConfigManager::load_with_env_prefix(
            Some(Path::new("/nonexistent/teamforge.toml")),
            "TEAMFORGE_TEST_MISSING",
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let file = write_toml("[resilience.retry]\njitter_factor = 3.0\n");
        let result =
            ConfigManager::load_with_env_prefix(Some(file.path()), "TEAMFORGE_TEST_INVALID");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_sanitization_masks_sensitive_fields() {
        let mut value = serde_json::json!({
            "session": {
                "client_secret": "super-secret-value",
                "graph_base_url": "https://graph.microsoft.com/v1.0"
            },
            "auth_token": "abc"
        });
        ConfigManager::sanitize_json_recursive(&mut value, &["secret", "token"]);

        assert_eq!(value["session"]["client_secret"], "[MASKED: su***ue]");
        assert_eq!(
            value["session"]["graph_base_url"],
            "https://graph.microsoft.com/v1.0"
        );
        assert_eq!(value["auth_token"], "[MASKED]");
    }
}
