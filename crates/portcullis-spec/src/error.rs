//! Specification loading errors.

use std::path::PathBuf;

use portcullis_router::RouterError;
use thiserror::Error;

/// Result type for specification loading.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors raised while loading or compiling OpenAPI documents.
///
/// Apart from [`SpecError::Directory`], every variant concerns a single
/// document: the loader logs it, skips that document and carries on.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SpecError {
    /// The specification directory could not be listed.
    #[error("failed to read specification directory {dir}")]
    Directory {
        /// Directory being listed.
        dir: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A document file could not be read.
    #[error("failed to read document {file}")]
    Read {
        /// File being read.
        file: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not a valid OpenAPI JSON document.
    #[error("failed to parse document {document}: {message}")]
    Parse {
        /// Document name.
        document: String,
        /// Parser message.
        message: String,
    },

    /// The document has no gateway extension block.
    #[error("document {document} has no {extension} extension")]
    MissingGatewayExtension {
        /// Document name.
        document: String,
        /// Extension key looked up.
        extension: String,
    },

    /// The gateway extension block exists but cannot be read.
    #[error("invalid gateway extension in {document}: {message}")]
    InvalidGatewayExtension {
        /// Document name.
        document: String,
        /// Parser message.
        message: String,
    },

    /// A security block cannot be read.
    #[error("invalid security block in {document} at {location}: {message}")]
    InvalidSecurity {
        /// Document name.
        document: String,
        /// Operation (and parameter) carrying the block, e.g. `GET /users`.
        location: String,
        /// Parser message.
        message: String,
    },

    /// A parameter `$ref` that does not point into `#/components/parameters`.
    #[error("unresolved parameter reference {reference} in {document}")]
    UnresolvedReference {
        /// Document name.
        document: String,
        /// The reference string.
        reference: String,
    },

    /// The document would introduce a second, differently named parameter
    /// segment next to an existing one.
    #[error("document {document} rejected: {source}")]
    AmbiguousParameter {
        /// Document name.
        document: String,
        /// Conflict details.
        #[source]
        source: RouterError,
    },

    /// Any other index insertion failure.
    #[error("document {document} rejected: {source}")]
    Index {
        /// Document name.
        document: String,
        /// Insertion error.
        #[source]
        source: RouterError,
    },
}

impl SpecError {
    /// Wraps an index insertion error for `document`.
    pub fn index(document: impl Into<String>, source: RouterError) -> Self {
        let document = document.into();
        if source.is_ambiguous() {
            Self::AmbiguousParameter { document, source }
        } else {
            Self::Index { document, source }
        }
    }

    /// Creates an invalid security block error.
    pub fn invalid_security(
        document: impl Into<String>,
        location: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidSecurity {
            document: document.into(),
            location: location.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the error only affects a single document.
    pub const fn is_document_error(&self) -> bool {
        !matches!(self, Self::Directory { .. })
    }
}
