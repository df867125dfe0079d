//! Error types for the Portcullis sidecar.

use http::StatusCode;
use portcullis_authz::AuthzError;
use portcullis_config::ConfigError;
use portcullis_core::{ErrorCategory, ErrorEnvelope};
use portcullis_spec::SpecError;
use portcullis_telemetry::TelemetryError;
use thiserror::Error;

/// Sidecar-specific errors.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The spec directory could not be read.
    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),

    /// The authorization client could not be built.
    #[error("Authorization client error: {0}")]
    Authz(#[from] AuthzError),

    /// Logging or metrics could not be initialized.
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The upstream service could not be reached or failed mid-response.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Error message.
        message: String,
    },

    /// The upstream service did not answer in time.
    #[error("Upstream timed out after {timeout_ms}ms")]
    UpstreamTimeout {
        /// Configured timeout.
        timeout_ms: u128,
    },

    /// The request body exceeds `server.max_body_bytes`.
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit.
        limit: usize,
    },

    /// The request body could not be read.
    #[error("Failed to read request body: {message}")]
    BodyRead {
        /// Error message.
        message: String,
    },

    /// Unknown `/_portcullis/` path.
    #[error("Unknown internal endpoint: {path}")]
    NotFound {
        /// Requested path.
        path: String,
    },

    /// Server startup error.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SidecarError {
    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }

    /// Create a body read error.
    pub fn body_read(message: impl Into<String>) -> Self {
        Self::BodyRead {
            message: message.into(),
        }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error.
    #[allow(clippy::match_same_arms)]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BodyRead { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Config(_)
            | Self::Spec(_)
            | Self::Authz(_)
            | Self::Telemetry(_)
            | Self::Server { .. }
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code for response envelopes.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Upstream { .. } => "BAD_GATEWAY",
            Self::UpstreamTimeout { .. } => "GATEWAY_TIMEOUT",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::BodyRead { .. } => "BAD_REQUEST",
            Self::NotFound { .. } => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Get the error category.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Upstream { .. } | Self::UpstreamTimeout { .. } => ErrorCategory::External,
            Self::PayloadTooLarge { .. } => ErrorCategory::PayloadTooLarge,
            Self::BodyRead { .. } | Self::NotFound { .. } => ErrorCategory::Validation,
            _ => ErrorCategory::Internal,
        }
    }

    /// Response body for this error.
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope::new(self.code(), self.to_string(), self.category(), request_id)
    }
}

/// Result type for sidecar operations.
pub type SidecarResult<T> = Result<T, SidecarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            SidecarError::upstream("connection refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SidecarError::UpstreamTimeout { timeout_ms: 30_000 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            SidecarError::PayloadTooLarge { limit: 16 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            SidecarError::body_read("reset").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SidecarError::server("bind failed").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope() {
        let err = SidecarError::PayloadTooLarge { limit: 1024 };
        let envelope = err.to_envelope(Some("req-123"));

        assert_eq!(envelope.error.code, "PAYLOAD_TOO_LARGE");
        assert_eq!(envelope.error.category, ErrorCategory::PayloadTooLarge);
        assert_eq!(envelope.error.message, "Request body exceeds 1024 bytes");
        assert_eq!(envelope.request_id.as_deref(), Some("req-123"));
    }

    #[test]
    fn test_error_display() {
        let err = SidecarError::NotFound {
            path: "/_portcullis/nope".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown internal endpoint: /_portcullis/nope");
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
