//! Security-annotated path index for Portcullis.
//!
//! This crate stores the authorization requirements of an API surface in a
//! prefix tree keyed by HTTP method and path segments. Every node may carry
//! a set of required roles and a table of parameter bindings (which request
//! parameter maps to which relationship check).
//!
//! # Features
//!
//! - **Method-first keys**: `GET /users/{id}` is stored as `get → users → {id}`
//! - **Path Parameters**: templated segments capture the request segment
//! - **Literal precedence**: exact segments win over parameters at each depth
//! - **Lock-free reads**: a built index is plain data, shareable across threads
//!
//! # Example
//!
//! ```rust
//! use portcullis_router::{PathIndex, SecurityBinding, SecurityRequirements};
//!
//! let mut index = PathIndex::new();
//! index
//!     .insert(
//!         "DELETE",
//!         "/providers/{providerId}/contracts/{contractId}",
//!         SecurityRequirements::new()
//!             .with_role("PROVIDER")
//!             .with_binding("providerId", SecurityBinding::path("provider", "manage").unwrap()),
//!     )
//!     .unwrap();
//!
//! let found = index.find("DELETE", "/providers/AAR/contracts/C-1").unwrap();
//! assert_eq!(found.params().get("providerId"), Some("AAR"));
//! assert_eq!(found.params().get("contractId"), Some("C-1"));
//! assert!(found.node().required_roles().contains("PROVIDER"));
//! ```
//!
//! # Architecture
//!
//! ```text
//!                    (root)
//!                      │
//!              ┌───────┴───────┐
//!              │               │
//!            "get"          "delete"
//!              │               │
//!           "users"       "providers"
//!              │               │
//!        ┌─────┴─────┐    "{providerId}"
//!        │           │         │
//!      "me"       "{id}"  "contracts"
//!   [roles: SELF]    │         │
//!                 (roles,  "{contractId}"
//!                bindings) [bindings]
//! ```
//!
//! A node has any number of literal children and at most one parameter
//! child. Nodes live in a single arena and refer to children by
//! [`NodeId`].

#![forbid(unsafe_code)]

mod error;
mod index;
mod node;
mod params;
mod security;

pub use error::{RouterError, RouterResult};
pub use index::PathIndex;
pub use node::{NodeId, PathNode, SegmentKind};
pub use params::PathParams;
pub use security::{ParameterLocation, SecurityBinding, SecurityRequirements};

/// A successful index lookup.
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    id: NodeId,
    node: &'a PathNode,
    params: PathParams,
}

impl<'a> MatchResult<'a> {
    pub(crate) fn new(id: NodeId, node: &'a PathNode, params: PathParams) -> Self {
        Self { id, node, params }
    }

    /// The matched node.
    #[must_use]
    pub fn node(&self) -> &'a PathNode {
        self.node
    }

    /// Arena id of the matched node.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parameters captured along the way.
    #[must_use]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Takes ownership of the captured parameters.
    #[must_use]
    pub fn into_params(self) -> PathParams {
        self.params
    }

    /// Returns true if the node requires neither roles nor checks.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.node.requirements().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_management() -> PathIndex {
        let mut index = PathIndex::new();
        index
            .insert(
                "get",
                "/api/usermanagement/users/{userId}",
                SecurityRequirements::new()
                    .with_role("PAYER")
                    .with_role("PROVIDER")
                    .with_binding("userId", SecurityBinding::path("user", "view").unwrap()),
            )
            .unwrap();
        index
            .insert(
                "delete",
                "/api/usermanagement/providers/{providerId}/contracts/{contractId}",
                SecurityRequirements::new()
                    .with_binding("providerId", SecurityBinding::path("provider", "manage").unwrap()),
            )
            .unwrap();
        index
    }

    #[test]
    fn test_basic_match() {
        let index = user_management();
        let found = index.find("GET", "/api/usermanagement/users/576985").unwrap();

        assert_eq!(found.node().segment(), "{userId}");
        assert_eq!(found.params().get("userId"), Some("576985"));
        assert_eq!(found.node().required_roles().len(), 2);
        assert!(!found.is_unrestricted());
    }

    #[test]
    fn test_multiple_params() {
        let index = user_management();
        let found = index
            .find("DELETE", "/api/usermanagement/providers/AAR/contracts/77")
            .unwrap();

        let params = found.into_params();
        assert_eq!(params.get("providerId"), Some("AAR"));
        assert_eq!(params.get("contractId"), Some("77"));
    }

    #[test]
    fn test_match_id_points_at_node() {
        let index = user_management();
        let found = index.find("get", "/api/usermanagement/users/1").unwrap();
        let by_id = index.node(found.id()).unwrap();
        assert_eq!(by_id.segment(), found.node().segment());
    }

    #[test]
    fn test_method_mismatch() {
        let index = user_management();
        assert!(index.find("POST", "/api/usermanagement/users/1").is_none());
    }
}
