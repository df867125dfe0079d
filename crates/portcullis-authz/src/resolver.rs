//! Turns parameter bindings into permission checks and runs them.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use portcullis_core::Subject;
use portcullis_router::{PathParams, SecurityBinding};
use portcullis_telemetry::metrics;
use tracing::{debug, info, warn};

use crate::client::{
    CheckPermissionRequest, Consistency, ObjectReference, Permissionship, PermissionsClient,
};
use crate::context::RequestContext;
use crate::error::{AuthzError, AuthzResult};

/// Default subject object type.
pub const DEFAULT_SUBJECT_TYPE: &str = "user";

/// One unit of authorization work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionCheck {
    /// Request parameter the value came from.
    pub parameter: String,
    /// Acting subject id.
    pub subject_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Resolved parameter value.
    pub resource_id: String,
    /// Permission evaluated.
    pub permission: String,
}

impl PermissionCheck {
    /// Builds the service request for this check.
    pub fn to_request(&self, subject_type: &str, consistency: Option<Consistency>) -> CheckPermissionRequest {
        let mut request = CheckPermissionRequest::new(
            ObjectReference::new(&self.resource_type, &self.resource_id),
            &self.permission,
            ObjectReference::new(subject_type, &self.subject_id),
        );
        request.consistency = consistency;
        request
    }
}

impl fmt::Display for PermissionCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} on {}:{}",
            self.subject_id, self.permission, self.resource_type, self.resource_id
        )
    }
}

/// Result of running one check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// `HAS_PERMISSION`.
    Granted,
    /// Any other permissionship.
    Denied(Permissionship),
    /// The service call failed.
    Failed(AuthzError),
}

impl CheckOutcome {
    /// Metrics label.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied(_) => "denied",
            Self::Failed(_) => "error",
        }
    }
}

/// Resolves binding values and submits checks to the authorization service.
#[derive(Clone)]
pub struct PermissionResolver {
    client: Arc<dyn PermissionsClient>,
    subject_type: String,
    consistency: Option<Consistency>,
}

impl fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionResolver")
            .field("subject_type", &self.subject_type)
            .field("consistency", &self.consistency)
            .finish_non_exhaustive()
    }
}

impl PermissionResolver {
    /// Creates a resolver with subject type `user` and no explicit consistency.
    pub fn new(client: Arc<dyn PermissionsClient>) -> Self {
        Self {
            client,
            subject_type: DEFAULT_SUBJECT_TYPE.to_string(),
            consistency: None,
        }
    }

    /// Sets the subject object type.
    #[must_use]
    pub fn with_subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = subject_type.into();
        self
    }

    /// Sets the consistency sent with every check.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = Some(consistency);
        self
    }

    /// The subject object type.
    pub fn subject_type(&self) -> &str {
        &self.subject_type
    }

    /// Builds one check per resolved value of parameter `name`.
    ///
    /// A parameter absent from the request yields no checks.
    pub async fn checks_for(
        &self,
        ctx: &RequestContext,
        name: &str,
        binding: &SecurityBinding,
        params: &PathParams,
        subject: &Subject,
    ) -> AuthzResult<Vec<PermissionCheck>> {
        let values = ctx.values_for(name, binding, params).await?;
        debug!(
            parameter = name,
            location = %binding.location,
            values = values.len(),
            "resolved parameter"
        );
        Ok(values
            .into_iter()
            .map(|value| PermissionCheck {
                parameter: name.to_string(),
                subject_id: subject.id.clone(),
                resource_type: binding.resource_type.clone(),
                resource_id: value,
                permission: binding.permission.clone(),
            })
            .collect())
    }

    /// Runs one check against the authorization service.
    pub async fn check(&self, check: &PermissionCheck) -> CheckOutcome {
        let request = check.to_request(&self.subject_type, self.consistency);
        let started = Instant::now();
        let result = self.client.check_permission(request).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(p) if p.is_granted() => CheckOutcome::Granted,
            Ok(p) => CheckOutcome::Denied(p),
            Err(e) => CheckOutcome::Failed(e),
        };
        metrics::record_permission_check(outcome.label(), elapsed);

        match &outcome {
            CheckOutcome::Granted => info!(
                parameter = %check.parameter,
                user_id = %check.subject_id,
                resource_type = %check.resource_type,
                resource_id = %check.resource_id,
                permission = %check.permission,
                "permission granted"
            ),
            CheckOutcome::Denied(p) => warn!(
                parameter = %check.parameter,
                user_id = %check.subject_id,
                resource_type = %check.resource_type,
                resource_id = %check.resource_id,
                permission = %check.permission,
                permissionship = p.as_str(),
                "permission denied"
            ),
            CheckOutcome::Failed(e) => warn!(
                parameter = %check.parameter,
                user_id = %check.subject_id,
                resource_type = %check.resource_type,
                resource_id = %check.resource_id,
                permission = %check.permission,
                error = %e,
                "error calling authorization service"
            ),
        }
        outcome
    }
}
