//! Security metadata attached to index nodes.
//!
//! A node carries the roles a caller must hold (any one of them) and, per
//! named request parameter, the relationship check that parameter's values
//! must pass.

use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};

use crate::error::RouterError;

/// Where a bound parameter's value is read from on a live request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    /// A templated path segment captured during the index walk.
    Path,
    /// Every query-string value under the parameter's name.
    Query,
    /// A form field or top-level JSON field of the request body.
    Body,
}

impl ParameterLocation {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterLocation {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            // gateway documents spell body-sourced parameters "request"
            "body" | "request" => Ok(Self::Body),
            other => Err(RouterError::UnknownLocation(other.to_string())),
        }
    }
}

/// How one request parameter maps onto a relationship check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityBinding {
    /// Where the value comes from.
    pub location: ParameterLocation,
    /// Object type checked against (e.g. `provider`).
    pub resource_type: String,
    /// Permission evaluated on the object (e.g. `view`).
    pub permission: String,
}

impl SecurityBinding {
    /// Creates a binding.
    ///
    /// Both `resource_type` and `permission` must be non-empty; a binding
    /// without either cannot produce a meaningful check.
    pub fn new(
        location: ParameterLocation,
        resource_type: impl Into<String>,
        permission: impl Into<String>,
    ) -> Result<Self, RouterError> {
        let resource_type = resource_type.into();
        let permission = permission.into();
        if resource_type.trim().is_empty() {
            return Err(RouterError::IncompleteBinding("resource type is empty"));
        }
        if permission.trim().is_empty() {
            return Err(RouterError::IncompleteBinding("permission is empty"));
        }
        Ok(Self {
            location,
            resource_type,
            permission,
        })
    }

    /// Shorthand for a path binding.
    pub fn path(
        resource_type: impl Into<String>,
        permission: impl Into<String>,
    ) -> Result<Self, RouterError> {
        Self::new(ParameterLocation::Path, resource_type, permission)
    }

    /// Shorthand for a query binding.
    pub fn query(
        resource_type: impl Into<String>,
        permission: impl Into<String>,
    ) -> Result<Self, RouterError> {
        Self::new(ParameterLocation::Query, resource_type, permission)
    }

    /// Shorthand for a body binding.
    pub fn body(
        resource_type: impl Into<String>,
        permission: impl Into<String>,
    ) -> Result<Self, RouterError> {
        Self::new(ParameterLocation::Body, resource_type, permission)
    }
}

/// Roles and parameter bindings required by one index entry.
///
/// Bindings keep their declaration order; checks are issued in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirements {
    roles: IndexSet<String>,
    bindings: IndexMap<String, SecurityBinding>,
}

impl SecurityRequirements {
    /// Creates empty requirements ("no authorization required").
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required role, builder style.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.add_role(role);
        self
    }

    /// Adds a parameter binding, builder style.
    #[must_use]
    pub fn with_binding(mut self, name: impl Into<String>, binding: SecurityBinding) -> Self {
        self.bind(name, binding);
        self
    }

    /// Adds a required role.
    pub fn add_role(&mut self, role: impl Into<String>) {
        self.roles.insert(role.into());
    }

    /// Binds a parameter name.
    ///
    /// Re-binding an existing name replaces the binding but keeps its
    /// original position.
    pub fn bind(&mut self, name: impl Into<String>, binding: SecurityBinding) {
        self.bindings.insert(name.into(), binding);
    }

    /// Roles of which the subject must hold at least one.
    #[must_use]
    pub fn roles(&self) -> &IndexSet<String> {
        &self.roles
    }

    /// Parameter bindings in declaration order.
    #[must_use]
    pub fn bindings(&self) -> &IndexMap<String, SecurityBinding> {
        &self.bindings
    }

    /// Returns true if neither roles nor bindings are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.bindings.is_empty()
    }

    /// Folds `other` into `self`: roles are unioned, bindings overwrite by name.
    pub fn merge(&mut self, other: SecurityRequirements) {
        self.roles.extend(other.roles);
        for (name, binding) in other.bindings {
            self.bindings.insert(name, binding);
        }
    }
}
