//! Authorization service contract.
//!
//! Types mirror the SpiceDB `CheckPermission` call: a resource, a
//! permission and a subject go in, a permissionship comes out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthzResult;

/// A typed object reference (`provider:AAR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// Object type, e.g. `provider`.
    pub object_type: String,
    /// Object id, e.g. `AAR`.
    pub object_id: String,
}

impl ObjectReference {
    /// Creates a reference.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

/// The subject of a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectReference {
    /// Subject object.
    pub object: ObjectReference,
    /// Optional relation on the subject object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_relation: Option<String>,
}

/// Read consistency requested from the authorization service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Consistency {
    /// Use whatever snapshot is fastest.
    #[default]
    MinimizeLatency,
    /// Read at the newest snapshot.
    FullyConsistent,
}

impl Serialize for Consistency {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let key = match self {
            Self::MinimizeLatency => "minimizeLatency",
            Self::FullyConsistent => "fullyConsistent",
        };
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(key, &true)?;
        map.end()
    }
}

/// One permission check request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPermissionRequest {
    /// Consistency requirement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consistency: Option<Consistency>,
    /// Object being accessed.
    pub resource: ObjectReference,
    /// Permission evaluated on the resource.
    pub permission: String,
    /// Who is asking.
    pub subject: SubjectReference,
}

impl CheckPermissionRequest {
    /// Creates a request for a plain subject (`user:123`).
    pub fn new(
        resource: ObjectReference,
        permission: impl Into<String>,
        subject: ObjectReference,
    ) -> Self {
        Self {
            consistency: None,
            resource,
            permission: permission.into(),
            subject: SubjectReference {
                object: subject,
                optional_relation: None,
            },
        }
    }

    /// Sets the consistency requirement.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }
}

/// Answer to a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permissionship {
    /// Unset.
    #[serde(rename = "PERMISSIONSHIP_UNSPECIFIED")]
    Unspecified,
    /// The subject does not have the permission.
    #[serde(rename = "PERMISSIONSHIP_NO_PERMISSION")]
    NoPermission,
    /// The subject has the permission.
    #[serde(rename = "PERMISSIONSHIP_HAS_PERMISSION")]
    HasPermission,
    /// The answer depends on caveat context that was not supplied.
    #[serde(rename = "PERMISSIONSHIP_CONDITIONAL_PERMISSION")]
    ConditionalPermission,
    /// A value this client does not know; treated as a denial.
    #[serde(rename = "PERMISSIONSHIP_UNRECOGNIZED", other)]
    Unrecognized,
}

impl Permissionship {
    /// Only [`Permissionship::HasPermission`] grants access.
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::HasPermission)
    }

    /// Short label for logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::NoPermission => "no_permission",
            Self::HasPermission => "has_permission",
            Self::ConditionalPermission => "conditional_permission",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// A relationship-based authorization service.
///
/// Implementations must be cheap to share; the authorizer holds one behind
/// an `Arc` and calls it from many requests at once. Dropping the returned
/// future must abandon the call.
#[async_trait]
pub trait PermissionsClient: Send + Sync {
    /// Checks one permission.
    async fn check_permission(&self, request: CheckPermissionRequest) -> AuthzResult<Permissionship>;
}

#[async_trait]
impl<T: PermissionsClient + ?Sized> PermissionsClient for Arc<T> {
    async fn check_permission(&self, request: CheckPermissionRequest) -> AuthzResult<Permissionship> {
        (**self).check_permission(request).await
    }
}
