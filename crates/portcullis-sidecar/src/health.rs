//! Health check functionality for the sidecar.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use portcullis_authz::IndexHandle;
use serde::{Deserialize, Serialize};

/// Health status of the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Sidecar is healthy.
    Healthy,
    /// The last spec reload failed; the previous index is still served.
    Degraded,
}

/// Readiness status of the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessStatus {
    /// Sidecar is ready to handle traffic.
    Ready,
    /// No route index has been loaded yet.
    NotReady,
}

impl ReadinessStatus {
    /// Check if the sidecar is ready.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall health status.
    pub status: HealthStatus,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Version information.
    pub version: String,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status.
    pub status: ReadinessStatus,
    /// Individual check results.
    pub checks: Vec<CheckResult>,
}

/// Result of a single readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Optional message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    /// Create a passing check result.
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: None,
        }
    }

    /// Create a failing check result.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: Some(message.into()),
        }
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Health checker for the sidecar.
///
/// Readiness follows the route index: the sidecar is ready once any index
/// has been stored in the [`IndexHandle`].
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    index: IndexHandle,
    reload_failed: AtomicBool,
}

impl HealthChecker {
    /// Create a new health checker watching `index`.
    pub fn new(index: IndexHandle) -> Self {
        Self {
            start_time: Instant::now(),
            index,
            reload_failed: AtomicBool::new(false),
        }
    }

    /// Records the outcome of the latest spec reload.
    pub fn record_reload(&self, success: bool) {
        self.reload_failed.store(!success, Ordering::Release);
    }

    /// Perform a liveness check.
    pub fn liveness(&self) -> HealthResponse {
        let status = if self.reload_failed.load(Ordering::Acquire) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Perform a readiness check.
    pub fn readiness(&self) -> ReadinessResponse {
        let check = if self.index.is_loaded() {
            let index = self.index.load();
            CheckResult::pass("index").with_message(format!(
                "generation {}, {} routes, {} secured",
                self.index.generation(),
                index.route_count(),
                index.secured_count()
            ))
        } else {
            CheckResult::fail("index", "no route index loaded")
        };

        let status = if check.passed {
            ReadinessStatus::Ready
        } else {
            ReadinessStatus::NotReady
        };

        ReadinessResponse {
            status,
            checks: vec![check],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_router::PathIndex;

    #[test]
    fn test_readiness_follows_index() {
        let index = IndexHandle::empty();
        let checker = HealthChecker::new(index.clone());

        let response = checker.readiness();
        assert_eq!(response.status, ReadinessStatus::NotReady);
        assert!(!response.checks[0].passed);

        index.store(PathIndex::new());
        let response = checker.readiness();
        assert!(response.status.is_ready());
        assert_eq!(
            response.checks[0].message.as_deref(),
            Some("generation 1, 0 routes, 0 secured")
        );
    }

    #[test]
    fn test_liveness_degrades_on_failed_reload() {
        let checker = HealthChecker::new(IndexHandle::empty());
        assert_eq!(checker.liveness().status, HealthStatus::Healthy);

        checker.record_reload(false);
        assert_eq!(checker.liveness().status, HealthStatus::Degraded);

        checker.record_reload(true);
        assert_eq!(checker.liveness().status, HealthStatus::Healthy);
    }

    #[test]
    fn test_response_serialization() {
        let response = ReadinessResponse {
            status: ReadinessStatus::NotReady,
            checks: vec![CheckResult::fail("index", "no route index loaded")],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "not_ready");
        assert_eq!(json["checks"][0]["name"], "index");

        let live = HealthChecker::new(IndexHandle::empty()).liveness();
        let json = serde_json::to_value(&live).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], crate::VERSION);
    }
}
