// HTTP API Error Types
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::StoreError;
use crate::security::{ErrorKind, SecurityError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    // 400 Bad Request
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 429 Too Many Requests
    TooManyRequests {
        message: String,
        retry_after_seconds: u64,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TooManyRequests { .. } => 429,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::TooManyRequests { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        });

        match self {
            ApiError::ValidationError { field_errors: Some(field_errors), .. } => {
                response["field_errors"] = json!(field_errors);
            }
            ApiError::TooManyRequests { retry_after_seconds, .. } => {
                response["retry_after_seconds"] = json!(retry_after_seconds);
            }
            _ => {}
        }

        response
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHENTICATED",
            ApiError::Forbidden(_) => "PERMISSION_DENIED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TooManyRequests { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl ErrorKind for ApiError {
    fn kind(&self) -> &'static str {
        self.error_code()
    }
}

impl From<SecurityError> for ApiError {
    fn from(err: SecurityError) -> Self {
        let message = err.to_string();
        match err {
            SecurityError::Validation { fields, .. } => {
                let field_errors = if fields.is_empty() {
                    None
                } else {
                    Some(
                        fields
                            .into_iter()
                            .map(|field| (field, "This field is invalid or missing".to_string()))
                            .collect(),
                    )
                };
                ApiError::validation_error(message, field_errors)
            }
            SecurityError::Authentication(msg) => ApiError::unauthorized(msg),
            SecurityError::Authorization(msg) => ApiError::forbidden(msg),
            SecurityError::RateLimitExceeded { retry_after_seconds } => ApiError::TooManyRequests {
                message,
                retry_after_seconds,
            },
            SecurityError::Dependency(msg) => {
                // Don't expose store internals to clients
                tracing::error!("Dependency error: {}", msg);
                ApiError::service_unavailable("Service temporarily unavailable")
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from(SecurityError::from(err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {}", err);
        ApiError::internal_server_error("Failed to process stored data")
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();

        if let ApiError::TooManyRequests { retry_after_seconds, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_security_taxonomy_to_status_codes() {
        let cases = [
            (SecurityError::validation("bad"), 400),
            (SecurityError::authentication("who"), 401),
            (SecurityError::authorization("no"), 403),
            (SecurityError::RateLimitExceeded { retry_after_seconds: 3 }, 429),
            (SecurityError::Dependency("db down".into()), 503),
        ];
        for (err, status) in cases {
            let kind = err.kind();
            let api = ApiError::from(err);
            assert_eq!(api.status_code(), status);
            assert_eq!(api.kind(), kind);
        }
    }

    #[test]
    fn validation_fields_become_field_errors() {
        let api = ApiError::from(SecurityError::Validation {
            message: "Missing required fields: b, c".into(),
            fields: vec!["b".into(), "c".into()],
        });
        let body = api.to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["field_errors"].get("b").is_some());
        assert!(body["field_errors"].get("c").is_some());
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let api = ApiError::from(SecurityError::RateLimitExceeded { retry_after_seconds: 42 });
        assert_eq!(api.to_json()["retry_after_seconds"], 42);

        let response = api.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }

    #[test]
    fn dependency_message_is_generic() {
        let api = ApiError::from(SecurityError::Dependency("connection refused at 10.0.0.5".into()));
        assert!(!api.message().contains("10.0.0.5"));
    }
}
