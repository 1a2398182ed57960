//! # Error Types
//!
//! Layered error taxonomy for the bulk directory-operations core.
//!
//! - [`DirectoryError`] covers a single call against the directory platform
//!   (session readiness, transient/permanent failures, validation, circuit
//!   breaker rejections, per-call timeouts).
//! - [`OrchestrationError`] covers a whole bulk run (invalid options, run-level
//!   timeout, cancellation, unknown process ids).
//!
//! Not-found is modelled as [`DirectoryError::NotFound`] inside the transport
//! and resilience layers only; entity command services translate it into
//! `Ok(None)` before it reaches callers.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a single directory call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectoryError {
    /// No live session; raised before any external call is attempted
    #[error("Directory session is not ready: {0}")]
    ConnectionNotReady(String),

    /// Retryable failure (network, HTTP 408/429/5xx)
    #[error("Transient failure during {operation}: {message}")]
    Transient {
        operation: String,
        status: Option<u16>,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Non-retryable failure (HTTP 4xx other than 404/408/429)
    #[error("Permanent failure during {operation}: {message}")]
    Permanent {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// The addressed entity does not exist
    #[error("{entity} '{id}' was not found")]
    NotFound { entity: String, id: String },

    /// Caller input was malformed; no external call was made
    #[error("Validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// The downstream's circuit breaker rejected the call
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// A single attempt exceeded its call budget
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// Response payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DirectoryError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether the resilience layer may retry this failure
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Whether this failure indicates downstream ill-health for the circuit breaker
    pub fn counts_as_breaker_failure(&self) -> bool {
        self.is_transient()
    }

    /// Circuit-open rejections are expected backpressure, not novel failures
    pub fn is_expected_backpressure(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// HTTP 409 style "already exists" responses
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Permanent { status: Some(409), .. })
    }

    /// Server-requested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable code used in per-item error reports
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionNotReady(_) => "CONNECTION_NOT_READY",
            Self::Transient { .. } => "TRANSIENT_EXHAUSTED",
            Self::Permanent { .. } => "PERMANENT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION",
            Self::CircuitOpen { .. } => "CIRCUIT_OPEN",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(error: serde_json::Error) -> Self {
        DirectoryError::Serialization(error.to_string())
    }
}

pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Errors raised by the bulk orchestrator and process registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestrationError {
    #[error("Invalid bulk operation options: {0}")]
    InvalidOptions(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bulk run exceeded its timeout of {minutes} minute(s)")]
    TimeoutExceeded { minutes: u64 },

    #[error("Cancellation requested for process {0}")]
    CancellationRequested(Uuid),

    #[error("Process {0} not found")]
    ProcessNotFound(Uuid),

    #[error("Directory session is not ready: {0}")]
    ConnectionNotReady(String),

    #[error("Directory error: {0}")]
    Directory(DirectoryError),
}

impl From<DirectoryError> for OrchestrationError {
    fn from(error: DirectoryError) -> Self {
        match error {
            DirectoryError::ConnectionNotReady(reason) => Self::ConnectionNotReady(reason),
            DirectoryError::Validation { field, reason } => {
                Self::InvalidInput(format!("{field}: {reason}"))
            }
            other => Self::Directory(other),
        }
    }
}

pub type OrchestrationResult<T> = std::result::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DirectoryError::transient("get_user", "503").is_transient());
        assert!(DirectoryError::Timeout {
            operation: "get_user".to_string(),
            timeout: Duration::from_secs(30),
        }
        .is_transient());
        assert!(!DirectoryError::permanent("create_team", "400").is_transient());
        assert!(!DirectoryError::not_found("user", "a@b.edu").is_transient());
        assert!(!DirectoryError::CircuitOpen {
            component: "directory".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_conflict_detection() {
        let conflict = DirectoryError::Permanent {
            operation: "create_user".to_string(),
            status: Some(409),
            message: "exists".to_string(),
        };
        assert!(conflict.is_conflict());
        assert!(!DirectoryError::permanent("create_user", "bad").is_conflict());
    }

    #[test]
    fn test_orchestration_conversion() {
        let err: OrchestrationError = DirectoryError::ConnectionNotReady("no session".into()).into();
        assert_eq!(
            err,
            OrchestrationError::ConnectionNotReady("no session".into())
        );

        let err: OrchestrationError = DirectoryError::validation("upn", "missing @").into();
        assert!(matches!(err, OrchestrationError::InvalidInput(_)));
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            DirectoryError::transient("x", "y").error_code(),
            "TRANSIENT_EXHAUSTED"
        );
        assert_eq!(
            DirectoryError::CircuitOpen {
                component: "directory".into()
            }
            .error_code(),
            "CIRCUIT_OPEN"
        );
    }
}
