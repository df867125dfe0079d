//! Error types for index construction.

use thiserror::Error;

/// Result type for index operations.
pub type RouterResult<T> = Result<T, RouterError>;

/// Errors raised while building a [`PathIndex`](crate::PathIndex).
///
/// Matching never fails with an error: an unknown path is simply `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RouterError {
    /// Two differently named parameter segments at the same depth.
    #[error("ambiguous parameter in {path}: {{{conflicting}}} conflicts with existing {{{existing}}}")]
    AmbiguousParameter {
        /// Full index key being inserted.
        path: String,
        /// Parameter name already present at this position.
        existing: String,
        /// Parameter name that was rejected.
        conflicting: String,
    },

    /// A templated segment with no name (`{}`).
    #[error("empty parameter name in {path}")]
    EmptyParameter {
        /// Full index key being inserted.
        path: String,
    },

    /// The HTTP method part of the key is empty.
    #[error("empty HTTP method")]
    EmptyMethod,

    /// A parameter location other than path, query or body.
    #[error("unknown parameter location: {0}")]
    UnknownLocation(String),

    /// A binding missing its resource type or permission.
    #[error("incomplete security binding: {0}")]
    IncompleteBinding(&'static str),
}

impl RouterError {
    /// Returns true if the error is a sibling-parameter conflict.
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousParameter { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_display() {
        let err = RouterError::AmbiguousParameter {
            path: "get/users/{userId}".to_string(),
            existing: "id".to_string(),
            conflicting: "userId".to_string(),
        };
        assert!(err.is_ambiguous());
        assert_eq!(
            err.to_string(),
            "ambiguous parameter in get/users/{userId}: {userId} conflicts with existing {id}"
        );
    }

    #[test]
    fn test_unknown_location_display() {
        let err = RouterError::UnknownLocation("cookie".to_string());
        assert!(!err.is_ambiguous());
        assert_eq!(err.to_string(), "unknown parameter location: cookie");
    }
}
