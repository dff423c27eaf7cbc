//! Error types for the Taskflow engine.
//!
//! Every public engine operation reports failures through [`EngineError`].
//! Only [`EngineError::DependencyUnavailable`] is retryable; the others
//! describe a request that will keep failing until the caller changes it.

use thiserror::Error;

use crate::definition::ValidationReport;

/// Engine-level errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Definition failed structural validation
    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationReport),

    /// Unknown definition, instance or task
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation is illegal for the current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Principal may not act on the resource
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Persistence or directory collaborator failed or timed out
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Definition document could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::DependencyUnavailable(_))
    }

    /// Short machine-readable name of the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ValidationFailed(_) => "validation_failed",
            EngineError::NotFound(_) => "not_found",
            EngineError::InvalidState(_) => "invalid_state",
            EngineError::Forbidden(_) => "forbidden",
            EngineError::DependencyUnavailable(_) => "dependency_unavailable",
            EngineError::Parse(_) => "parse",
            EngineError::Config(_) => "config",
            EngineError::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias using EngineError.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                tracing::warn!(
                    error = %db_err,
                    constraint = ?db_err.constraint(),
                    "Unique constraint violated"
                );
                return EngineError::InvalidState(format!("already exists: {}", db_err.message()));
            }
        }
        tracing::error!(error = %err, "Database error");
        EngineError::DependencyUnavailable(format!("database: {}", err))
    }
}

impl From<envy::Error> for EngineError {
    fn from(err: envy::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        EngineError::DependencyUnavailable("collaborator call timed out".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ValidationIssue;

    #[test]
    fn test_not_found_error() {
        let err = EngineError::NotFound("task 42".to_string());
        assert_eq!(err.to_string(), "Resource not found: task 42");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_validation_error_lists_issues() {
        let mut report = ValidationReport::default();
        report.errors.push(ValidationIssue::new(Some("sign"), "unknown target 'nowhere'"));
        let err = EngineError::ValidationFailed(report);
        assert_eq!(
            err.to_string(),
            "Validation failed: step 'sign': unknown target 'nowhere'"
        );
    }

    #[test]
    fn test_only_dependency_errors_are_retryable() {
        assert!(EngineError::DependencyUnavailable("db".into()).is_retryable());
        assert!(!EngineError::Forbidden("bob".into()).is_retryable());
        assert!(!EngineError::InvalidState("done".into()).is_retryable());
    }

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct FakeDbError {
        message: String,
        unique: bool,
    }

    impl sqlx::error::DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            &self.message
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            if self.unique {
                sqlx::error::ErrorKind::UniqueViolation
            } else {
                sqlx::error::ErrorKind::Other
            }
        }
    }

    fn db_error(unique: bool) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError {
            message: "duplicate key value violates unique constraint".to_string(),
            unique,
        }))
    }

    #[test]
    fn test_unique_violation_is_invalid_state() {
        let err = EngineError::from(db_error(true));
        assert!(matches!(err, EngineError::InvalidState(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_other_database_errors_are_retryable() {
        let err = EngineError::from(db_error(false));
        assert!(matches!(err, EngineError::DependencyUnavailable(_)));
        assert!(err.is_retryable());

        let err = EngineError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, EngineError::DependencyUnavailable(_)));
    }
}
