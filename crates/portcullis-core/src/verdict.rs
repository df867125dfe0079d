//! Authorization verdicts.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ErrorEnvelope};

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DenyReason {
    /// No usable subject could be extracted.
    Unauthenticated,
    /// The subject holds none of the required roles.
    MissingRole,
    /// The authorization service answered with anything but "has permission".
    PermissionDenied,
    /// The authorization service could not be reached or failed.
    UpstreamError,
    /// A body-sourced binding needed a body that could not be decoded.
    BodyDecode,
}

impl DenyReason {
    /// Kebab-case name, also used as a metrics label.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::MissingRole => "missing-role",
            Self::PermissionDenied => "permission-denied",
            Self::UpstreamError => "upstream-error",
            Self::BodyDecode => "body-decode",
        }
    }

    /// Machine-readable error code for response envelopes.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::MissingRole => "MISSING_ROLE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::BodyDecode => "BODY_DECODE_ERROR",
        }
    }

    /// Error category of this reason.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthenticated => ErrorCategory::Authentication,
            Self::MissingRole | Self::PermissionDenied => ErrorCategory::Authorization,
            Self::UpstreamError => ErrorCategory::Internal,
            Self::BodyDecode => ErrorCategory::Validation,
        }
    }

    /// Status code surfaced to the client.
    ///
    /// An upstream failure is reported as 500 rather than the category's
    /// 502: the caller cannot tell which side failed.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamError => StatusCode::INTERNAL_SERVER_ERROR,
            other => other.category().default_status_code(),
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of authorizing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the request.
    Allow,
    /// Reject the request.
    Deny {
        /// Why.
        reason: DenyReason,
        /// Human-readable detail (never contains token material).
        detail: String,
    },
}

impl Verdict {
    /// Creates a denial.
    pub fn deny(reason: DenyReason, detail: impl Into<String>) -> Self {
        Self::Deny {
            reason,
            detail: detail.into(),
        }
    }

    /// Returns true for [`Verdict::Allow`].
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// The deny reason, if denied.
    pub const fn reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow => None,
            Self::Deny { reason, .. } => Some(*reason),
        }
    }

    /// Label for logs and metrics: `allow` or the deny reason.
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny { reason, .. } => reason.as_str(),
        }
    }

    /// HTTP status for this verdict.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Allow => StatusCode::OK,
            Self::Deny { reason, .. } => reason.status_code(),
        }
    }

    /// Response body for a denial.
    pub fn to_envelope(&self, request_id: Option<&str>) -> Option<ErrorEnvelope> {
        match self {
            Self::Allow => None,
            Self::Deny { reason, detail } => Some(ErrorEnvelope::new(
                reason.code(),
                detail.clone(),
                reason.category(),
                request_id,
            )),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Deny { reason, detail } => write!(f, "deny ({reason}): {detail}"),
        }
    }
}
