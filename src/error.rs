//! Error types for the Dataproc reconciliation engine.
//!
//! This module provides the error hierarchy for every phase of a
//! reconciliation: configuration and validation, the Dataproc REST API,
//! planning, the apply driver itself, and the local state store.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::FieldDiff;

/// The main error type for the Dataproc reconciliation engine.
#[derive(Debug, Error)]
pub enum DataprocError {
    /// Configuration and validation errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dataproc API errors.
    #[error("Dataproc API error: {0}")]
    Api(#[from] ApiError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// State store errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A required field is missing or a value is malformed.
    #[error("Validation failed for {kind} field '{field}': {message}")]
    ValidationError {
        /// Resource kind being validated.
        kind: String,
        /// Dotted path of the offending field.
        field: String,
        /// Description of the validation error.
        message: String,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// The manifest names a resource kind this engine does not manage.
    #[error("Unknown resource kind: {kind}")]
    UnknownKind {
        /// The unrecognized kind.
        kind: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of the duplicated resource.
        kind: String,
        /// The duplicated name.
        name: String,
    },
}

/// Dataproc API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The resource does not exist (HTTP 404).
    #[error("Resource not found: {url}")]
    NotFound {
        /// URL that returned 404.
        url: String,
    },

    /// Concurrent modification (HTTP 409).
    #[error("Conflict on {url}: {body}")]
    Conflict {
        /// URL that returned 409.
        url: String,
        /// Response body.
        body: String,
    },

    /// Rate limited (HTTP 429) after the transport gave up retrying.
    #[error("Dataproc API rate limited on {url}")]
    RateLimited {
        /// URL that was rate limited.
        url: String,
    },

    /// Authentication failed or no token could be obtained.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// Any other non-2xx response.
    #[error("Dataproc API request failed: {status} - {body}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Network error.
    #[error("Network error communicating with Dataproc: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from Dataproc API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// A long-running operation finished with an error.
    #[error("Operation {name} failed with code {code}: {message}")]
    OperationFailed {
        /// Operation resource name.
        name: String,
        /// Status code reported by the operation.
        code: i32,
        /// Status message reported by the operation.
        message: String,
    },

    /// The call deadline elapsed before the request completed.
    #[error("Deadline exceeded after {elapsed_ms}ms calling {url}")]
    DeadlineExceeded {
        /// URL being called.
        url: String,
        /// Time spent before giving up.
        elapsed_ms: u128,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The change cannot be applied in place, or a lifecycle option forbids it.
    #[error("Infeasible update for {kind} '{name}': {reason}")]
    InfeasibleUpdate {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Why the update is infeasible.
        reason: String,
    },

    /// A diff names an update operation the resource does not define.
    #[error("Unknown update operation '{operation}' for {kind}")]
    UnknownOperation {
        /// Resource kind.
        kind: String,
        /// The undefined operation name.
        operation: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Verification after apply still found differences.
    #[error("{kind} '{name}' did not converge after apply: {} residual diff(s)", diffs.len())]
    DiffAfterApply {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Differences remaining after apply.
        diffs: Vec<FieldDiff>,
    },

    /// The resource was still visible after every delete poll.
    #[error("{kind} '{name}' still exists after {polls} delete poll(s)")]
    NotDeleted {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Number of polls made.
        polls: u32,
    },

    /// Maximum retry attempts exceeded.
    #[error("Maximum retry attempts ({attempts}) exceeded for {resource}: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Resource that failed.
        resource: String,
        /// The final error seen.
        last_error: String,
    },

    /// One or more deletions in a bulk delete failed.
    #[error("Failed to delete {} {kind} resource(s): {}", failures.len(), failures.join("; "))]
    BulkDeleteFailed {
        /// Resource kind.
        kind: String,
        /// One message per failed deletion.
        failures: Vec<String>,
    },
}

/// State store errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// The state file could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for Dataproc operations.
pub type Result<T> = std::result::Result<T, DataprocError>;

impl DataprocError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the API reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(ApiError::NotFound { .. }))
    }

    /// Returns true if the API reported a concurrent modification.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Api(ApiError::Conflict { .. }))
    }

    /// Returns true if the transport may retry this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Api(ApiError::RateLimited { .. } | ApiError::NetworkError { .. }) => true,
            Self::Api(ApiError::ApiRequestFailed { status, .. }) => *status >= 500,
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(
        kind: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ValidationError {
            kind: kind.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a "required field missing" validation error.
    #[must_use]
    pub fn required(kind: impl Into<String>, field: impl Into<String>) -> Self {
        Self::validation(kind, field, "required field is not set")
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, body: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            body: body.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl PlanError {
    /// Creates an infeasible update error.
    #[must_use]
    pub fn infeasible(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InfeasibleUpdate {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_and_conflict_classification() {
        let not_found: DataprocError = ApiError::NotFound {
            url: String::from("https://example.test/x"),
        }
        .into();
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());
        assert!(!not_found.is_retryable());

        let conflict: DataprocError = ApiError::Conflict {
            url: String::from("https://example.test/x"),
            body: String::new(),
        }
        .into();
        assert!(conflict.is_conflict());
        assert!(!conflict.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(DataprocError::from(ApiError::network("reset")).is_retryable());
        assert!(DataprocError::from(ApiError::api_error(503, "unavailable")).is_retryable());
        assert!(!DataprocError::from(ApiError::api_error(400, "bad request")).is_retryable());
        assert!(!DataprocError::internal("boom").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ConfigError::required("AutoscalingPolicy", "workerConfig.maxInstances");
        assert_eq!(
            err.to_string(),
            "Validation failed for AutoscalingPolicy field 'workerConfig.maxInstances': required field is not set"
        );

        let err = PlanError::infeasible("Cluster", "c1", "field clusterName requires recreation");
        assert!(err.to_string().contains("Infeasible update for Cluster 'c1'"));
    }
}
