//! Error Types for icongate API
//!
//! This module defines error handling for the HTTP layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//! - Conversion from the gateway error taxonomy
//!
//! Every error leaves the service as `{status: "error", code, error, query?,
//! timestamp}`. Resource and upstream failures all map to 500; `code` tells
//! them apart.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use icongate_core::{GatewayError, ResourceError, UpstreamError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Required field is missing from request
    MissingField,

    /// Field value is out of valid range
    InvalidRange,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Gateway Errors (500)
    // ========================================================================
    /// The shared remote session could not be created or used
    ResourceUnavailable,

    /// The remote search endpoint failed or returned an unusable payload
    UpstreamError,

    /// The remote search endpoint did not answer in time
    UpstreamTimeout,

    /// The admission queue is shut down or dropped the task
    QueueClosed,

    /// Internal server error
    InternalError,

    // ========================================================================
    // Availability Errors (503)
    // ========================================================================
    /// Admission rejected; reserved, the queue currently never rejects
    CapacityExceeded,

    /// Service is temporarily unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::MissingField | ErrorCode::InvalidRange | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::ResourceUnavailable
            | ErrorCode::UpstreamError
            | ErrorCode::UpstreamTimeout
            | ErrorCode::QueueClosed
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::CapacityExceeded | ErrorCode::ServiceUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::ResourceUnavailable => "Remote session unavailable",
            ErrorCode::UpstreamError => "Upstream search failed",
            ErrorCode::UpstreamTimeout => "Upstream search timed out",
            ErrorCode::QueueClosed => "Request queue is closed",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::CapacityExceeded => "Too many pending searches",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// The search query the error belongs to, when there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            query: None,
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the query the failed request was for.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidRange error.
    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    code: ErrorCode,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
    timestamp: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status: "error",
            code: self.code,
            error: &self.message,
            query: self.query.as_deref(),
            details: self.details.as_ref(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM GATEWAY ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(field),
            ValidationError::OutOfRange { field, min, max, .. } => {
                ApiError::invalid_range(field, min, max)
                    .with_details(serde_json::json!({ "reason": err.to_string() }))
            }
            ValidationError::InvalidFormat { .. } => {
                ApiError::new(ErrorCode::InvalidFormat, err.to_string())
            }
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(inner) => inner.into(),
            GatewayError::ResourceUnavailable(inner) => {
                let message = match &inner {
                    ResourceError::Closed => "Service is shutting down".to_string(),
                    other => other.to_string(),
                };
                ApiError::new(ErrorCode::ResourceUnavailable, message)
            }
            GatewayError::Upstream(inner) => match &inner {
                UpstreamError::Timeout { .. } => {
                    ApiError::new(ErrorCode::UpstreamTimeout, inner.to_string())
                }
                UpstreamError::Status { status, .. } => {
                    ApiError::new(ErrorCode::UpstreamError, inner.to_string())
                        .with_details(serde_json::json!({ "upstream_status": status }))
                }
                _ => ApiError::new(ErrorCode::UpstreamError, inner.to_string()),
            },
            GatewayError::CapacityExceeded { pending } => {
                ApiError::from_code(ErrorCode::CapacityExceeded)
                    .with_details(serde_json::json!({ "pending": pending }))
            }
            GatewayError::QueueClosed => ApiError::from_code(ErrorCode::QueueClosed),
            GatewayError::TaskAborted { reason } => {
                tracing::error!(%reason, "Queued search aborted");
                ApiError::internal_error("Search task aborted")
            }
            GatewayError::Config(inner) => ApiError::internal_error(inner.to_string()),
        }
    }
}

impl From<prometheus::Error> for ApiError {
    fn from(err: prometheus::Error) -> Self {
        tracing::error!("Prometheus error: {:?}", err);
        ApiError::internal_error("Metrics registry failure")
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidRange.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::ResourceUnavailable.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::UpstreamTimeout.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::CapacityExceeded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert!(ErrorCode::InvalidFormat.is_client_error());
        assert!(!ErrorCode::UpstreamError.is_client_error());
    }

    #[test]
    fn test_validation_conversion() {
        let err: ApiError = GatewayError::from(ValidationError::RequiredFieldMissing {
            field: "query".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("query"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upstream_conversion() {
        let err: ApiError = GatewayError::from(UpstreamError::Timeout { timeout_ms: 30_000 }).into();
        assert_eq!(err.code, ErrorCode::UpstreamTimeout);

        let err: ApiError = GatewayError::from(UpstreamError::Status {
            status: 502,
            reason: "Bad Gateway".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(
            err.details,
            Some(serde_json::json!({ "upstream_status": 502 }))
        );
    }

    #[test]
    fn test_resource_conversion() {
        let err: ApiError = GatewayError::from(ResourceError::CreationFailed {
            reason: "connection refused".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ResourceUnavailable);
        assert!(err.message.contains("connection refused"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_task_aborted_is_internal() {
        let err: ApiError = GatewayError::TaskAborted {
            reason: "panicked".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn test_with_query() {
        let err = ApiError::from_code(ErrorCode::UpstreamError).with_query("home");
        assert_eq!(err.query.as_deref(), Some("home"));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::missing_field("query");
        let json = serde_json::to_string(&err)?;
        assert!(json.contains("MISSING_FIELD"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::internal_error("boom");
        let display = format!("{}", err);
        assert!(display.contains("InternalError"));
        assert!(display.contains("boom"));
    }
}
