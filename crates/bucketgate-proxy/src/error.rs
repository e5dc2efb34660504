//! Error types for the bucketgate proxy.

use std::fmt;

use bucketgate_authz::AuthzError;
use bucketgate_bucket::BucketError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// No target is mounted at the request path.
    #[error("no bucket mounted at {path}")]
    NoTarget {
        /// Request path.
        path: String,
    },

    /// Access refused by policy, or no access rule covers the request.
    #[error("Access denied: {reason}")]
    Forbidden {
        /// Reason for denial.
        reason: String,
    },

    /// Verb outside GET, HEAD, PUT and DELETE.
    #[error("method {method} not allowed")]
    MethodNotAllowed {
        /// Request method.
        method: String,
    },

    /// Upload larger than the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Limit in bytes.
        limit: u64,
    },

    /// Malformed request.
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message.
        message: String,
    },

    /// The request deadline elapsed outside a policy or bucket call.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The policy decision could not be obtained and the resource is
    /// configured to surface that as an error. Failures a retry may cure
    /// answer 503.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// Bucket operation failure.
    #[error(transparent)]
    Bucket(#[from] BucketError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Create a forbidden error.
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Server { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoTarget { .. } => StatusCode::NOT_FOUND,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            Self::Authz(e) if e.is_deadline() => StatusCode::GATEWAY_TIMEOUT,
            Self::Authz(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            Self::Authz(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Bucket(e) => e.status_code(),
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for metrics and error bodies.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Server { .. } => "server",
            Self::NoTarget { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::BadRequest { .. } => "bad_request",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Authz(e) => e.category(),
            Self::Bucket(e) => e.category(),
            Self::Io(_) => "io",
        }
    }
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Server errors expose only the status reason; endpoint URLs and backend
/// failures stay in the logs.
impl From<&ProxyError> for ErrorResponse {
    fn from(err: &ProxyError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            Self::new(
                err.category(),
                status.canonical_reason().unwrap_or("internal error"),
            )
        } else {
            Self::new(err.category(), err.to_string())
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ProxyError::config("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::forbidden("no").status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::PayloadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ProxyError::from(BucketError::not_found("a")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ProxyError::from(AuthzError::deadline_exceeded("http://opa")).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::from(AuthzError::status("http://opa", 503)).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ProxyError::from(AuthzError::status("http://opa", 404)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ProxyError::from(AuthzError::protocol("http://opa", "result is not a boolean"))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_hides_server_details() {
        let err = ProxyError::from(AuthzError::status("http://opa.internal:8181/v1", 500));
        let body = ErrorResponse::from(&err).with_request_id("req-1");
        assert_eq!(body.message, "Service Unavailable");
        assert!(!body.to_string().contains("opa.internal"));
        assert_eq!(body.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_error_response_keeps_client_details() {
        let err = ProxyError::from(BucketError::FolderRemoval {
            path: "docs/".to_string(),
        });
        let body = ErrorResponse::from(&err);
        assert_eq!(body.error, "folder_removal");
        assert_eq!(body.message, "can't remove folder docs/");
    }

    #[test]
    fn test_error_response_serialization() {
        let json = serde_json::to_value(ErrorResponse::new("forbidden", "Access denied")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "forbidden", "message": "Access denied"})
        );
    }
}
