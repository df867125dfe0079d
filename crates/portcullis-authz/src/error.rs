//! Error types for the authorization crate.

use portcullis_core::DenyReason;
use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors that can occur while resolving or checking permissions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// The authorization service could not be reached.
    #[error("authorization service unreachable: {0}")]
    Transport(String),

    /// The authorization service answered with an error status.
    #[error("authorization service returned {status}: {message}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The authorization service answered with something unreadable.
    #[error("invalid authorization service response: {0}")]
    InvalidResponse(String),

    /// The request body could not be decoded for a body-sourced binding.
    #[error("unable to decode request body: {0}")]
    BodyDecode(String),

    /// The query string could not be decoded.
    #[error("unable to decode query string: {0}")]
    QueryDecode(String),

    /// Client construction failed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthzError {
    /// Creates a body decode error.
    pub fn body_decode(message: impl Into<String>) -> Self {
        Self::BodyDecode(message.into())
    }

    /// Returns true if the error came from talking to the authorization service.
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::UpstreamStatus { .. } | Self::InvalidResponse(_)
        )
    }

    /// The deny reason this error surfaces as.
    pub const fn deny_reason(&self) -> DenyReason {
        match self {
            Self::BodyDecode(_) | Self::QueryDecode(_) => DenyReason::BodyDecode,
            _ => DenyReason::UpstreamError,
        }
    }
}

impl From<reqwest::Error> for AuthzError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_reason_mapping() {
        assert_eq!(
            AuthzError::body_decode("expected value at line 1").deny_reason(),
            DenyReason::BodyDecode
        );
        assert_eq!(
            AuthzError::QueryDecode("bad".to_string()).deny_reason(),
            DenyReason::BodyDecode
        );
        assert_eq!(
            AuthzError::Transport("connection refused".to_string()).deny_reason(),
            DenyReason::UpstreamError
        );
    }

    #[test]
    fn test_is_upstream() {
        let err = AuthzError::UpstreamStatus {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_upstream());
        assert!(err.to_string().contains("503"));
        assert!(!AuthzError::body_decode("x").is_upstream());
    }
}
