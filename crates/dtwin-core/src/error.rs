//! Error types for the deletion engine
//!
//! Failures surfaced to callers of the orchestrator:
//! - classified service failures, tagged with the operation that hit them
//! - model validation failures with every parse issue
//! - partial failures of bulk operations
//! - the no-progress condition of cyclic model sets

use dtwin_model::{ModelId, ParseIssue, RepositoryError};
use dtwin_service::ServiceError;
use std::path::PathBuf;

/// Result type for deletion operations
pub type DeletionResult<T> = Result<T, DeletionError>;

/// Deletion engine error
#[derive(Debug, thiserror::Error)]
pub enum DeletionError {
    /// The service rejected a call
    #[error("{operation} failed: {error_code} ({status}): {message}")]
    ServiceCallFailed {
        /// Operation that failed, e.g. `delete_model dtmi:x:A;1`
        operation: String,
        /// HTTP status (0 for transport failures)
        status: u16,
        /// Service error code
        error_code: String,
        /// Service message
        message: String,
    },

    /// Definition texts do not conform to the definition language
    #[error("model validation failed with {} issue(s)", issues.len())]
    ValidationFailed {
        /// Every issue reported by the parser
        issues: Vec<ParseIssue>,
    },

    /// Target absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Bulk operation finished with some per-item failures
    #[error("{} of {} item(s) failed", failed_ids.len(), succeeded + failed_ids.len())]
    PartialFailure {
        /// Items that succeeded
        succeeded: usize,
        /// Items that failed
        failed_ids: Vec<String>,
    },

    /// A pass found no deletable model while models remained
    #[error("no deletable model among {} remaining (reference cycle or external referrer)", remaining.len())]
    NoProgress {
        /// Models still in the working set
        remaining: Vec<ModelId>,
    },

    /// Run was cancelled; completed deletions are not rolled back
    #[error("operation cancelled")]
    Cancelled,

    /// Repository failure other than validation
    #[error(transparent)]
    Repository(RepositoryError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeletionError {
    /// Wrap a service failure of `operation`
    pub fn service(operation: impl Into<String>, err: ServiceError) -> Self {
        Self::ServiceCallFailed {
            operation: operation.into(),
            status: err.status,
            error_code: err.error_code,
            message: err.message,
        }
    }

    /// HTTP status of a service failure
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServiceCallFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Error code of a service failure
    #[inline]
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::ServiceCallFailed { error_code, .. } => Some(error_code),
            _ => None,
        }
    }

    /// Check if the target was absent
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || self.status() == Some(404)
    }

    /// Check if the run was cancelled
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<RepositoryError> for DeletionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Validation(issues) => Self::ValidationFailed { issues },
            other => Self::Repository(other),
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML syntax or shape error
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Extension is neither TOML nor YAML
    #[error("unsupported configuration format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// No endpoint configured for a command that needs the service
    #[error("no service endpoint configured (set `endpoint`, DTWIN_ENDPOINT or --endpoint)")]
    MissingEndpoint,

    /// Value out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_failure_keeps_classification() {
        let err = DeletionError::service(
            "delete_model dtmi:t:A;1",
            ServiceError::conflict("ModelReferencesNotDeleted", "still referenced"),
        );
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.error_code(), Some("ModelReferencesNotDeleted"));
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "delete_model dtmi:t:A;1 failed: ModelReferencesNotDeleted (409): still referenced"
        );
    }

    #[test]
    fn validation_errors_become_validation_failed() {
        let err: DeletionError =
            RepositoryError::Validation(vec![ParseIssue::new("invalid JSON")]).into();
        assert!(matches!(err, DeletionError::ValidationFailed { ref issues } if issues.len() == 1));

        let err: DeletionError = RepositoryError::DirectoryNotFound("models".into()).into();
        assert!(matches!(err, DeletionError::Repository(_)));
    }

    #[test]
    fn partial_failure_message_counts_items() {
        let err = DeletionError::PartialFailure {
            succeeded: 3,
            failed_ids: vec!["t1".into()],
        };
        assert_eq!(err.to_string(), "1 of 4 item(s) failed");
    }
}
