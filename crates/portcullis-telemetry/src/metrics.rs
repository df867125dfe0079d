//! Prometheus metrics for Portcullis.
//!
//! Recording goes through the `metrics` facade, so the functions here are
//! no-ops until [`init_metrics`] installs the Prometheus recorder.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `portcullis_decisions_total` | Counter | `outcome` | Verdicts by outcome |
//! | `portcullis_permission_checks_total` | Counter | `result` | Authorization service calls |
//! | `portcullis_permission_check_duration_seconds` | Histogram | - | Call latency |
//! | `portcullis_index_reloads_total` | Counter | `result` | Route index rebuilds |
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_telemetry::metrics::{record_decision, record_permission_check};
//!
//! record_permission_check("granted", Duration::from_millis(4));
//! record_decision("allow");
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Verdict counter.
pub const DECISIONS_TOTAL: &str = "portcullis_decisions_total";
/// Permission check counter.
pub const PERMISSION_CHECKS_TOTAL: &str = "portcullis_permission_checks_total";
/// Permission check latency histogram.
pub const PERMISSION_CHECK_DURATION: &str = "portcullis_permission_check_duration_seconds";
/// Index reload counter.
pub const INDEX_RELOADS_TOTAL: &str = "portcullis_index_reloads_total";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are recorded.
    pub enabled: bool,

    /// Histogram buckets for permission check latency, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // 1ms .. 5s
            duration_buckets: vec![
                0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
        }
    }
}

/// Renders the installed recorder.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    /// Wraps a Prometheus handle.
    #[must_use]
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    /// Renders all metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn builder(config: &MetricsConfig) -> TelemetryResult<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(PERMISSION_CHECK_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))
}

/// Installs the global Prometheus recorder.
///
/// Returns `None` when metrics are disabled. Installing twice returns the
/// first registry again.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if another recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(Some(MetricsRegistry::new(handle.clone())));
    }

    let handle = builder(config)?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = METRICS_HANDLE.get_or_init(|| handle).clone();
    register_metric_descriptions();

    Ok(Some(MetricsRegistry::new(handle)))
}

/// Renders metrics in Prometheus format, or `None` before [`init_metrics`].
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(DECISIONS_TOTAL, "Authorization verdicts by outcome");
    describe_counter!(
        PERMISSION_CHECKS_TOTAL,
        "Authorization service checks by result"
    );
    describe_histogram!(
        PERMISSION_CHECK_DURATION,
        Unit::Seconds,
        "Authorization service check latency"
    );
    describe_counter!(INDEX_RELOADS_TOTAL, "Route index rebuilds by result");
}

/// Records a verdict. `outcome` is `allow` or a deny reason.
pub fn record_decision(outcome: &'static str) {
    counter!(DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Records one authorization service call.
///
/// `result` is `granted`, `denied` or `error`.
pub fn record_permission_check(result: &'static str, duration: Duration) {
    counter!(PERMISSION_CHECKS_TOTAL, "result" => result).increment(1);
    histogram!(PERMISSION_CHECK_DURATION).record(duration.as_secs_f64());
}

/// Records an index rebuild.
pub fn record_index_reload(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!(INDEX_RELOADS_TOTAL, "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_metrics(&config).unwrap().is_none());
    }

    #[test]
    fn test_recorded_values_render() {
        let recorder = builder(&MetricsConfig::default()).unwrap().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_decision("allow");
            record_decision("allow");
            record_decision("permission-denied");
            record_permission_check("granted", Duration::from_millis(3));
            record_index_reload(false);
        });

        let output = handle.render();
        assert!(output.contains(r#"portcullis_decisions_total{outcome="allow"} 2"#));
        assert!(output.contains(r#"portcullis_decisions_total{outcome="permission-denied"} 1"#));
        assert!(output.contains(r#"portcullis_permission_checks_total{result="granted"} 1"#));
        assert!(output.contains("portcullis_permission_check_duration_seconds_bucket"));
        assert!(output.contains(r#"portcullis_index_reloads_total{result="failure"} 1"#));
    }

    #[test]
    fn test_record_functions_without_recorder() {
        record_decision("unauthenticated");
        record_permission_check("error", Duration::from_millis(10));
        record_index_reload(true);
    }
}
