use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Infrastructure and backend adapter errors.
///
/// Adapters must report upstream throttling as [`AppError::RateLimitExceeded`]
/// and rejected credentials as [`AppError::Unauthorized`]; the dispatcher
/// branches on that distinction.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed with an unexpected status or body.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Upstream reported too many requests for the credential in use.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Upstream rejected the credential (invalid, expired, suspended).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The worker loop is gone or refused the job.
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimitExceeded(_))
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::Unauthorized(_))
    }

    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded(_) => {
                true
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }
}

/// Failure classes a dispatched job can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing arguments. No credential consumed.
    Validation,
    /// No usable credential left in the pool.
    AuthExhausted,
    /// Provider says the credential is invalid.
    AuthRejected,
    /// Provider says too many requests; the credential was quarantined.
    RateLimited,
    /// Any other adapter failure, timeouts included.
    Backend,
    /// The result itself could not be encoded.
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AuthExhausted => "auth_exhausted",
            ErrorKind::AuthRejected => "auth_rejected",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Backend => "backend",
            ErrorKind::Serialization => "serialization",
        }
    }

    /// Whether resubmitting the same job later can succeed.
    ///
    /// A rate-limited job can go through on the next credential; backend
    /// failures are mostly transient. Everything else needs a different job
    /// or an operator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimited | ErrorKind::Backend)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified dispatch failure: machine-checkable kind plus display message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DispatchError {
    kind: ErrorKind,
    message: String,
}

impl DispatchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::NetworkError("reset".into()).is_retryable());
        assert!(AppError::Timeout(30).is_retryable());
        assert!(AppError::RateLimitExceeded("429".into()).is_retryable());
        assert!(!AppError::Unauthorized("bad token".into()).is_retryable());
        assert!(!AppError::ConfigError("missing".into()).is_retryable());
    }

    #[test]
    fn test_rate_limit_and_auth_are_distinct() {
        let limited = AppError::RateLimitExceeded("slow down".into());
        let rejected = AppError::Unauthorized("expired".into());
        assert!(limited.is_rate_limit() && !limited.is_auth_failure());
        assert!(rejected.is_auth_failure() && !rejected.is_rate_limit());
    }

    #[test]
    fn test_kind_retryability() {
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Backend.is_retryable());
        assert!(!ErrorKind::AuthRejected.is_retryable());
        assert!(!ErrorKind::AuthExhausted.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Serialization.is_retryable());
    }

    #[test]
    fn test_dispatch_error_displays_message_only() {
        let err = DispatchError::validation("query is required");
        assert_eq!(err.to_string(), "query is required");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.kind().as_str(), "validation");
    }
}
