//! Error types for the control service.

use thanos_sdk::SdkError;

/// Result type alias using [`ServiceError`].
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors that can occur in the orchestration service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request failed validation.
    #[error("{0}")]
    Validation(String),

    /// A state-machine guard rejected the operation.
    #[error("{0}")]
    Conflict(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A job observed its cancellation token. Recovered locally, never
    /// surfaced to API callers.
    #[error("operation cancelled")]
    Cancelled,

    /// The external deployment tooling failed.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Persisted JSON could not be (de)serialised.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Programming error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a state-guard conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status code this error renders as.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Conflict(_) => 400,
            Self::NotFound(_) => 404,
            Self::Cancelled
            | Self::Sdk(_)
            | Self::Database(_)
            | Self::Serialisation(_)
            | Self::Internal(_) => 500,
        }
    }
}

impl From<SdkError> for ServiceError {
    fn from(err: SdkError) -> Self {
        match err {
            SdkError::Cancelled => Self::Cancelled,
            SdkError::BadConfig(msg) => Self::Validation(msg),
            other => Self::Sdk(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialisation(err.to_string())
    }
}
