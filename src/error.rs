//! Core error type shared across the store, crawler, and web layers.

use std::time::Duration;

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Classification of an error for retry scheduling and HTTP mapping.
///
/// Every [`CoreError`] maps onto exactly one kind; the kind (not the concrete
/// variant) drives the backoff table in [`crate::crawler::retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateViolation,
    Duplicate,
    RateLimit,
    ExternalService,
    Database,
    Timeout,
    Application,
    Unexpected,
}

impl ErrorKind {
    /// Whether a job failing with this kind should be rescheduled.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::ExternalService
                | ErrorKind::Database
                | ErrorKind::Application
                | ErrorKind::Unexpected
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StateViolation => "state_violation",
            ErrorKind::Duplicate => "duplicate",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Database => "database",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Application => "application",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    StateViolation(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("rate limited by news provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("news provider error: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Application(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::StateViolation(_) => ErrorKind::StateViolation,
            CoreError::Duplicate(_) => ErrorKind::Duplicate,
            CoreError::RateLimited { .. } => ErrorKind::RateLimit,
            CoreError::ExternalService(_) => ErrorKind::ExternalService,
            CoreError::Database(_) => ErrorKind::Database,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Application(_) => ErrorKind::Application,
            CoreError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Provider-supplied retry hint, when one exists.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
