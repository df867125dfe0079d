//! OpenAPI security-annotation loading for Portcullis.
//!
//! Reads gateway API definitions (OpenAPI 3.x JSON documents carrying a
//! gateway extension block) and compiles their `x-security` annotations
//! into a [`PathIndex`](portcullis_router::PathIndex).
//!
//! # Annotations
//!
//! ```json
//! {
//!   "paths": {
//!     "/providers/{providerCode}/payment-accounts/{accountCode}": {
//!       "get": {
//!         "x-security": {
//!           "roles": ["PROVIDER"],
//!           "parameters": [
//!             {"name": "providerCode", "in": "path", "resource": "provider", "permission": "view"}
//!           ]
//!         },
//!         "parameters": [{
//!           "name": "accountCode", "in": "path",
//!           "x-security": {"resource": "payment-account", "permission": "view"}
//!         }]
//!       }
//!     }
//!   },
//!   "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/api/v3/provider/"}}}
//! }
//! ```
//!
//! # Example
//!
//! ```rust
//! use portcullis_spec::{SpecCompiler, SpecOptions};
//!
//! let doc = r#"{
//!     "paths": {"/users/{userId}": {"get": {"x-security": {"roles": ["PAYER"]}}}},
//!     "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/api/usermanagement/"}}}
//! }"#;
//!
//! let mut compiler = SpecCompiler::new(SpecOptions::default());
//! compiler.add_document("usermanagement-oas.json", doc).unwrap();
//! let index = compiler.finish();
//!
//! let found = index.find("GET", "/api/usermanagement/users/42").unwrap();
//! assert!(found.node().required_roles().contains("PAYER"));
//! ```

#![forbid(unsafe_code)]

pub mod compiler;
pub mod document;
pub mod error;
pub mod loader;

pub use compiler::{
    CompiledOperation, SpecCompiler, SpecOptions, DEFAULT_GATEWAY_EXTENSION,
    DEFAULT_SECURITY_EXTENSION,
};
pub use document::OpenApiDocument;
pub use error::{SpecError, SpecResult};
pub use loader::{LoadReport, SkippedDocument, SpecLoader, DEFAULT_FILE_SUFFIX};
