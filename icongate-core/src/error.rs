//! Error taxonomy shared by every icongate crate.
//!
//! Errors are grouped by who is at fault: the caller (`ValidationError`),
//! the shared remote session (`ResourceError`), the remote search endpoint
//! (`UpstreamError`) or the deployment (`ConfigError`). `GatewayError` is the
//! master type that the orchestrator returns.

use thiserror::Error;

/// Caller input that can never succeed as given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Field {field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: String,
        value: String,
        min: u64,
        max: u64,
    },

    #[error("Field {field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Failures creating, probing or using the shared remote session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Session creation failed: {reason}")]
    CreationFailed { reason: String },

    #[error("Session probe failed: {reason}")]
    ProbeFailed { reason: String },

    #[error("Resource handle is closed")]
    Closed,
}

/// Failures reported by (or while talking to) the remote search endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("Upstream returned HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Upstream request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Upstream transport error: {reason}")]
    Transport { reason: String },

    #[error("Upstream payload malformed: {reason}")]
    MalformedPayload { reason: String },

    #[error("Upstream reported an error: {message}")]
    Reported { message: String },
}

/// Invalid deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the cache-and-admission layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(#[from] ResourceError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Reserved for admission rejection. The current queue never rejects.
    #[error("Admission capacity exceeded: {pending} tasks pending")]
    CapacityExceeded { pending: usize },

    #[error("Admission queue is closed")]
    QueueClosed,

    #[error("Queued task aborted: {reason}")]
    TaskAborted { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl GatewayError {
    /// Whether the error was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, GatewayError::Validation(_))
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
