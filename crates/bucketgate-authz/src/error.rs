//! Error types for the authorization crate.
//!
//! None of these is a verdict. A `Denied` answer from the policy is an
//! [`AuthorizationDecision`](crate::AuthorizationDecision), not an error.

use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Reasons a policy decision could not be obtained.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// The endpoint could not be reached or the connection broke.
    #[error("policy endpoint {endpoint} unreachable: {source}")]
    Transport {
        /// Policy endpoint URL.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with a non-success status.
    #[error("policy endpoint {endpoint} returned status {status}")]
    Status {
        /// Policy endpoint URL.
        endpoint: String,
        /// HTTP status received.
        status: u16,
    },

    /// The request could not be encoded or the answer could not be decoded.
    #[error("policy endpoint {endpoint} protocol error: {message}")]
    Protocol {
        /// Policy endpoint URL.
        endpoint: String,
        /// What was wrong.
        message: String,
    },

    /// The request deadline expired before the endpoint answered.
    #[error("policy endpoint {endpoint} did not answer before the request deadline")]
    DeadlineExceeded {
        /// Policy endpoint URL.
        endpoint: String,
    },

    /// Invalid authorization configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthzError {
    /// Create a transport error.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Create a status error.
    pub fn status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
        }
    }

    /// Create a protocol error.
    pub fn protocol(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a deadline error.
    pub fn deadline_exceeded(endpoint: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            endpoint: endpoint.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Network-level failure.
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Encoding or decoding failure.
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Whether the request deadline ran out.
    pub const fn is_deadline(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    /// Whether an upstream retry could plausibly succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::DeadlineExceeded { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Protocol { .. } | Self::Config(_) => false,
        }
    }

    /// Short machine-readable category used in logs.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Protocol { .. } => "protocol",
            Self::DeadlineExceeded { .. } => "deadline",
            Self::Config(_) => "config",
        }
    }

    /// Policy endpoint involved, when there is one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Protocol { endpoint, .. }
            | Self::DeadlineExceeded { endpoint } => Some(endpoint),
            Self::Config(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error() {
        let err = AuthzError::status("http://opa/allow", 503);
        assert!(!err.is_transport());
        assert!(!err.is_protocol());
        assert!(err.is_retryable());
        assert_eq!(err.category(), "status");
        assert_eq!(err.endpoint(), Some("http://opa/allow"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_protocol_error() {
        let err = AuthzError::protocol("http://opa/allow", "result is not a boolean");
        assert!(err.is_protocol());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("not a boolean"));
    }

    #[test]
    fn test_deadline_error() {
        let err = AuthzError::deadline_exceeded("http://opa/allow");
        assert!(err.is_deadline());
        assert!(err.is_retryable());
        assert_eq!(err.category(), "deadline");
    }

    #[test]
    fn test_client_status_not_retryable() {
        assert!(!AuthzError::status("http://opa/allow", 400).is_retryable());
    }

    #[test]
    fn test_config_error_has_no_endpoint() {
        let err = AuthzError::config("empty url");
        assert_eq!(err.endpoint(), None);
        assert_eq!(err.to_string(), "configuration error: empty url");
    }
}
