use thiserror::Error;

use crate::database::StoreError;

/// Failures produced by the secured function pipeline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("{message}")]
    Validation { message: String, fields: Vec<String> },

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Authorization(String),

    #[error("Rate limit exceeded. Try again in {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Dependency unavailable: {0}")]
    Dependency(String),
}

impl SecurityError {
    pub fn validation(message: impl Into<String>) -> Self {
        SecurityError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        SecurityError::Validation {
            message: message.into(),
            fields: vec![field.into()],
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        SecurityError::Authentication(message.into())
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        SecurityError::Authorization(message.into())
    }
}

impl From<StoreError> for SecurityError {
    fn from(err: StoreError) -> Self {
        SecurityError::Dependency(err.to_string())
    }
}

/// Machine-readable error code, recorded in access logs and sent to clients
pub trait ErrorKind {
    fn kind(&self) -> &'static str;
}

impl ErrorKind for SecurityError {
    fn kind(&self) -> &'static str {
        match self {
            SecurityError::Validation { .. } => "VALIDATION_ERROR",
            SecurityError::Authentication(_) => "UNAUTHENTICATED",
            SecurityError::Authorization(_) => "PERMISSION_DENIED",
            SecurityError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            SecurityError::Dependency(_) => "DEPENDENCY_UNAVAILABLE",
        }
    }
}
