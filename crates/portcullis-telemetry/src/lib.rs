//! Observability for Portcullis.
//!
//! - **Logging**: structured JSON (or pretty) output through `tracing-subscriber`
//! - **Metrics**: Prometheus-format counters and histograms via the `metrics` crate
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            portcullis-telemetry              │
//! │                                              │
//! │   ┌──────────────┐      ┌──────────────┐     │
//! │   │   Logging    │      │   Metrics    │     │
//! │   │ (EnvFilter + │      │ (Prometheus  │     │
//! │   │  fmt layer)  │      │  recorder)   │     │
//! │   └──────┬───────┘      └──────┬───────┘     │
//! └──────────┼─────────────────────┼─────────────┘
//!            ▼                     ▼
//!      stdout/stderr      /_portcullis/metrics
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let registry = init_telemetry(&TelemetryConfig::default())?;
//! if let Some(registry) = registry {
//!     println!("{}", registry.render());
//! }
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use self::error::TelemetryError;
pub use self::logging::{init_logging, LogConfig, LogFormat};
pub use self::metrics::{init_metrics, render_metrics, MetricsConfig, MetricsRegistry};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Logging configuration.
    pub logging: LogConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

/// Initializes logging, then metrics.
///
/// Returns the metrics registry when metrics are enabled.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)
}
