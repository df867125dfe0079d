//! Configuration schema types.
//!
//! Every section rejects unknown fields and defaults every field, so a file
//! only needs to name what it changes.

use std::time::Duration;

use portcullis_core::{IdentityOptions, Verification};
use portcullis_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// Listener and upstream settings.
///
/// # Example
///
/// ```
/// use portcullis_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:9000".to_string(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Where allowed requests are forwarded.
    #[serde(default = "default_upstream_url")]
    pub upstream_url: String,

    /// Upstream request timeout in milliseconds.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_ms: u64,

    /// Largest request body accepted, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            upstream_url: default_upstream_url(),
            upstream_timeout_ms: default_upstream_timeout(),
            max_body_bytes: default_max_body_bytes(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Upstream timeout as a duration.
    pub const fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Shutdown timeout as a duration.
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upstream_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_upstream_timeout() -> u64 {
    30_000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Where OpenAPI documents are read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SpecsConfig {
    /// Directory scanned for documents.
    #[serde(default = "default_specs_dir")]
    pub dir: String,

    /// Only files ending in this suffix are loaded.
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,

    /// Gateway vendor extension key.
    #[serde(default = "default_gateway_extension")]
    pub gateway_extension: String,

    /// Security vendor extension key.
    #[serde(default = "default_security_extension")]
    pub security_extension: String,

    /// Rebuild the index when the directory changes.
    #[serde(default = "default_true")]
    pub watch: bool,

    /// Quiet period before a rebuild, in milliseconds.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

impl Default for SpecsConfig {
    fn default() -> Self {
        Self {
            dir: default_specs_dir(),
            file_suffix: default_file_suffix(),
            gateway_extension: default_gateway_extension(),
            security_extension: default_security_extension(),
            watch: true,
            debounce_ms: default_debounce(),
        }
    }
}

impl SpecsConfig {
    /// Debounce window as a duration.
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_specs_dir() -> String {
    "/mnt/tyk-gateway/apps".to_string()
}

fn default_file_suffix() -> String {
    "-oas.json".to_string()
}

fn default_gateway_extension() -> String {
    "x-tyk-api-gateway".to_string()
}

fn default_security_extension() -> String {
    "x-security".to_string()
}

fn default_debounce() -> u64 {
    500
}

/// Read consistency requested from the authorization service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Fastest available snapshot.
    #[default]
    MinimizeLatency,
    /// Newest snapshot.
    FullyConsistent,
}

/// Authorization service connection.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthzConfig {
    /// Base URL of the permissions API.
    #[serde(default = "default_authz_endpoint")]
    pub endpoint: String,

    /// Preshared key sent as a bearer token.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-check timeout in milliseconds.
    #[serde(default = "default_authz_timeout")]
    pub timeout_ms: u64,

    /// Object type of the acting subject.
    #[serde(default = "default_subject_type")]
    pub subject_type: String,

    /// Consistency sent with each check.
    #[serde(default)]
    pub consistency: ConsistencyMode,
}

impl std::fmt::Debug for AuthzConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzConfig")
            .field("endpoint", &self.endpoint)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("subject_type", &self.subject_type)
            .field("consistency", &self.consistency)
            .finish()
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            endpoint: default_authz_endpoint(),
            bearer_token: None,
            timeout_ms: default_authz_timeout(),
            subject_type: default_subject_type(),
            consistency: ConsistencyMode::default(),
        }
    }
}

impl AuthzConfig {
    /// Check timeout as a duration.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_authz_endpoint() -> String {
    "http://127.0.0.1:8443".to_string()
}

fn default_authz_timeout() -> u64 {
    5_000
}

fn default_subject_type() -> String {
    "user".to_string()
}

/// Bearer token handling.
///
/// ```toml
/// [identity]
/// subject_claim = "userId"
/// verification = { hs256 = { secret = "change-me" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Authorization scheme.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Claim holding the subject id.
    #[serde(default = "default_subject_claim")]
    pub subject_claim: String,

    /// Claim holding the role list.
    #[serde(default = "default_roles_claim")]
    pub roles_claim: String,

    /// Signature verification.
    #[serde(default)]
    pub verification: Verification,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            subject_claim: default_subject_claim(),
            roles_claim: default_roles_claim(),
            verification: Verification::None,
        }
    }
}

impl IdentityConfig {
    /// Extractor options for this section.
    pub fn to_identity_options(&self) -> IdentityOptions {
        IdentityOptions {
            scheme: self.scheme.clone(),
            subject_claim: self.subject_claim.clone(),
            roles_claim: self.roles_claim.clone(),
            verification: self.verification.clone(),
        }
    }
}

fn default_scheme() -> String {
    "Bearer".to_string()
}

fn default_subject_claim() -> String {
    "userId".to_string()
}

fn default_roles_claim() -> String {
    "roles".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info", "portcullis_authz=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
        }
    }
}

impl LoggingConfig {
    /// Telemetry settings for this section.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            ..LogConfig::default()
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Record metrics and serve them on the metrics endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Telemetry section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TelemetryConfig {
    /// Settings for `portcullis_telemetry::init_telemetry`.
    pub fn to_telemetry_config(&self) -> portcullis_telemetry::TelemetryConfig {
        portcullis_telemetry::TelemetryConfig {
            logging: self.logging.to_log_config(),
            metrics: portcullis_telemetry::MetricsConfig {
                enabled: self.metrics.enabled,
                ..portcullis_telemetry::MetricsConfig::default()
            },
        }
    }
}

const fn default_true() -> bool {
    true
}
