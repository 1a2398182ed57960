//! # Structured Logging Module
//!
//! Environment-aware structured logging for bulk runs and directory calls.
//! Console output is human readable by default; set `TEAMFORGE_LOG_FORMAT=json`
//! for JSON lines. `TEAMFORGE_LOG` overrides the environment-derived filter.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = std::env::var("TEAMFORGE_LOG")
            .unwrap_or_else(|_| get_log_level(&environment).to_string());
        let json = std::env::var("TEAMFORGE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(filter.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(filter.clone()))
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            filter = %filter,
            json = json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `TEAMFORGE_ENV`, defaulting to development
pub fn get_environment() -> String {
    std::env::var("TEAMFORGE_ENV").unwrap_or_else(|_| "development".to_string())
}

/// Default log filter for an environment
pub fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "test" => "debug",
        "development" => "debug",
        "production" => "info",
        _ => "debug",
    }
}

/// Log a bulk run lifecycle transition
pub fn log_bulk_operation(
    operation: &str,
    process_id: Uuid,
    status: &str,
    total_items: usize,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        process_id = %process_id,
        status = %status,
        total_items = total_items,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "BULK_OPERATION"
    );
}

/// Log the outcome of a single directory call
pub fn log_directory_call(
    operation: &str,
    component: &str,
    attempt: u32,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::debug!(
        operation = %operation,
        component = %component,
        attempt = attempt,
        status = %status,
        duration_ms = duration_ms,
        "DIRECTORY_CALL"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        std::env::set_var("TEAMFORGE_ENV", "test_override");
        let env = get_environment();
        assert_eq!(env, "test_override");
        std::env::remove_var("TEAMFORGE_ENV");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_bulk_operation("bulk_onboarding", Uuid::new_v4(), "running", 3, None);
    }
}
