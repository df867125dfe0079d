//! Portcullis Authorization - relationship-based request checks
//!
//! This crate decides whether a request may reach the upstream service.
//! Route requirements come from a [`PathIndex`] built out of OpenAPI
//! documents; permission answers come from a SpiceDB-compatible service.
//!
//! # Decision flow
//!
//! ```text
//!   request ──► PathIndex::find ──► no match / no metadata ──► Allow
//!                    │
//!                    ▼
//!            SubjectExtractor ──► no token ──► Deny(unauthenticated)
//!                    │
//!                    ▼
//!              role gate ──► none held ──► Deny(missing-role)
//!                    │
//!                    ▼
//!   for each binding, for each value:
//!       PermissionsClient::check_permission
//!          ├─ HAS_PERMISSION ──► next
//!          ├─ anything else  ──► Deny(permission-denied)
//!          └─ error          ──► Deny(upstream-error)
//!                    │
//!                    ▼
//!                  Allow
//! ```
//!
//! Checks run one at a time in document order and stop at the first
//! denial, so a denied request costs as few service calls as possible.
//!
//! # Example
//!
//! ```ignore
//! use portcullis_authz::{Authorizer, HttpClientConfig, HttpPermissionsClient, IndexHandle, RequestContext};
//! use portcullis_core::{IdentityOptions, SubjectExtractor};
//!
//! let client = HttpPermissionsClient::new(HttpClientConfig::new("http://spicedb:8443"))?;
//! let authorizer = Authorizer::new(
//!     IndexHandle::new(index),
//!     Arc::new(client),
//!     SubjectExtractor::new(IdentityOptions::default()),
//! );
//!
//! let verdict = authorizer.authorize(&RequestContext::new(method, uri, headers, body)).await;
//! ```

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod client;
pub mod context;
pub mod error;
pub mod http_client;
pub mod index_handle;
pub mod resolver;

use std::sync::Arc;

use portcullis_core::{DenyReason, SubjectExtractor, Verdict};
use portcullis_router::PathIndex;
use portcullis_telemetry::metrics;
use tracing::{debug, info, warn};

pub use aggregator::{DecisionAggregator, Step};
pub use client::{
    CheckPermissionRequest, Consistency, ObjectReference, Permissionship, PermissionsClient,
    SubjectReference,
};
pub use context::{DecodedBody, RequestContext};
pub use error::{AuthzError, AuthzResult};
pub use http_client::{HttpClientConfig, HttpPermissionsClient};
pub use index_handle::IndexHandle;
pub use resolver::{CheckOutcome, PermissionCheck, PermissionResolver, DEFAULT_SUBJECT_TYPE};

/// Authorizes requests against the live route index.
#[derive(Debug, Clone)]
pub struct Authorizer {
    index: IndexHandle,
    resolver: PermissionResolver,
    extractor: Arc<SubjectExtractor>,
}

impl Authorizer {
    /// Creates an authorizer.
    pub fn new(
        index: IndexHandle,
        client: Arc<dyn PermissionsClient>,
        extractor: SubjectExtractor,
    ) -> Self {
        Self {
            index,
            resolver: PermissionResolver::new(client),
            extractor: Arc::new(extractor),
        }
    }

    /// Sets the subject object type sent with checks (default `user`).
    #[must_use]
    pub fn with_subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.resolver = self.resolver.with_subject_type(subject_type);
        self
    }

    /// Sets the consistency sent with checks.
    #[must_use]
    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.resolver = self.resolver.with_consistency(consistency);
        self
    }

    /// The route index handle.
    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Decides one request and records the decision metric.
    pub async fn authorize(&self, ctx: &RequestContext) -> Verdict {
        let index = self.index.load();
        let verdict = self.decide(&index, ctx).await;
        metrics::record_decision(verdict.outcome());
        match &verdict {
            Verdict::Allow => debug!(
                method = %ctx.method(),
                path = ctx.path(),
                "request allowed"
            ),
            Verdict::Deny { reason, detail } => info!(
                method = %ctx.method(),
                path = ctx.path(),
                reason = reason.as_str(),
                detail = %detail,
                "request denied"
            ),
        }
        verdict
    }

    async fn decide(&self, index: &PathIndex, ctx: &RequestContext) -> Verdict {
        let Some(found) = index.find(ctx.method().as_str(), ctx.path()) else {
            debug!(method = %ctx.method(), path = ctx.path(), "no security metadata for route");
            return Verdict::Allow;
        };
        if found.is_unrestricted() {
            return Verdict::Allow;
        }
        let node = found.node();

        let subject = match self.extractor.extract(ctx.headers()) {
            Ok(subject) => subject,
            Err(e) => {
                warn!(error = %e, "unable to identify caller");
                return Verdict::deny(DenyReason::Unauthenticated, e.to_string());
            }
        };

        let mut agg = DecisionAggregator::new();
        if let Step::Done(verdict) = agg.check_roles(node.required_roles(), &subject) {
            warn!(
                subject = %subject.log_id(),
                missing_roles = ?node.required_roles(),
                "caller lacks a required role"
            );
            return verdict;
        }

        for (name, binding) in node.parameter_bindings() {
            let checks = match self
                .resolver
                .checks_for(ctx, name, binding, found.params(), &subject)
                .await
            {
                Ok(checks) => checks,
                Err(e) => {
                    warn!(parameter = %name, error = %e, "unable to resolve parameter");
                    if let Step::Done(verdict) = agg.fail(e) {
                        return verdict;
                    }
                    continue;
                }
            };
            for check in checks {
                let outcome = self.resolver.check(&check).await;
                if let Step::Done(verdict) = agg.record(&check, outcome) {
                    return verdict;
                }
            }
        }
        agg.decide()
    }
}
