//! Error types for Portcullis.
//!
//! [`IdentityError`] covers every way a bearer token can fail to yield a
//! subject. [`ErrorCategory`] and [`ErrorEnvelope`] classify failures and
//! give them a serializable shape for responses.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request input.
    Validation,
    /// Missing or unusable credentials.
    Authentication,
    /// The caller is not allowed to do this.
    Authorization,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// A downstream service failed.
    External,
    /// Internal failure.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Reasons a bearer token does not produce a [`Subject`](crate::Subject).
///
/// Every variant maps to an `unauthenticated` denial.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IdentityError {
    /// No `Authorization` header.
    #[error("authorization header missing")]
    MissingHeader,

    /// The header value is not visible ASCII.
    #[error("authorization header is not valid text")]
    InvalidHeader,

    /// The header does not start with the expected scheme.
    #[error("authorization type not {expected}")]
    WrongScheme {
        /// Expected scheme, e.g. `Bearer`.
        expected: String,
    },

    /// Not a three-part token, or the payload is not base64url.
    #[error("invalid token format: {0}")]
    MalformedToken(String),

    /// The payload is not a JSON object.
    #[error("invalid token payload: {0}")]
    InvalidPayload(String),

    /// The subject claim is absent.
    #[error("token is missing the {claim} claim")]
    MissingSubject {
        /// Claim name.
        claim: String,
    },

    /// The subject claim is neither a non-empty string nor a number.
    #[error("token claim {claim} is not a usable subject id")]
    InvalidSubject {
        /// Claim name.
        claim: String,
    },

    /// The roles claim is present but not a list of strings.
    #[error("token claim {claim} is not a list of roles")]
    InvalidRoles {
        /// Claim name.
        claim: String,
    },

    /// Signature or registered-claim validation failed.
    #[error("token verification failed: {0}")]
    Verification(String),
}

impl IdentityError {
    /// Creates a malformed token error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken(reason.into())
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::Authentication
    }
}

/// Serializable error response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// Error details.
    pub error: ErrorDetail,
    /// Request id for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error details inside an [`ErrorEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable code, e.g. `PERMISSION_DENIED`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
}

impl ErrorEnvelope {
    /// Creates an envelope.
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        category: ErrorCategory,
        request_id: Option<&str>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                category,
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_status_codes() {
        assert_eq!(ErrorCategory::Validation.default_status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCategory::Authentication.default_status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCategory::Authorization.default_status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ErrorCategory::PayloadTooLarge.default_status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ErrorCategory::Internal.default_status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_identity_error_display() {
        let err = IdentityError::WrongScheme { expected: "Bearer".to_string() };
        assert_eq!(err.to_string(), "authorization type not Bearer");
        assert_eq!(err.category(), ErrorCategory::Authentication);

        let err = IdentityError::MissingSubject { claim: "userId".to_string() };
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = ErrorEnvelope::new(
            "MISSING_ROLE",
            "subject lacks a required role",
            ErrorCategory::Authorization,
            Some("req-1"),
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["error"]["code"], "MISSING_ROLE");
        assert_eq!(json["error"]["category"], "authorization");
        assert_eq!(json["request_id"], "req-1");

        let anonymous = ErrorEnvelope::new("X", "y", ErrorCategory::Internal, None);
        let json = serde_json::to_string(&anonymous).unwrap();
        assert!(!json.contains("request_id"));
    }
}
