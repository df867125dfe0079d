//! Core types for Portcullis.
//!
//! - [`SubjectExtractor`] reads the acting [`Subject`] from a bearer token.
//! - [`Verdict`] is the outcome of authorizing a request, with a
//!   [`DenyReason`] and its HTTP status mapping.
//! - [`ErrorEnvelope`] is the JSON body returned with a denial.
//!
//! | Verdict | Status |
//! |---|---|
//! | `Allow` | 200 (request forwarded) |
//! | `Deny(unauthenticated)` | 401 |
//! | `Deny(missing-role)` | 403 |
//! | `Deny(permission-denied)` | 403 |
//! | `Deny(body-decode)` | 400 |
//! | `Deny(upstream-error)` | 500 |

#![forbid(unsafe_code)]

pub mod error;
pub mod identity;
pub mod verdict;

pub use error::{ErrorCategory, ErrorDetail, ErrorEnvelope, IdentityError};
pub use identity::{
    decode_claims, Claims, IdentityOptions, Subject, SubjectExtractor, Verification,
};
pub use verdict::{DenyReason, Verdict};
