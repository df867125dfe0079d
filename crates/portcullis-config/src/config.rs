//! Root configuration type.

use std::net::SocketAddr;

use portcullis_core::Verification;
use portcullis_telemetry::logging::create_env_filter;
use serde::{Deserialize, Serialize};

use crate::schema::{AuthzConfig, IdentityConfig, ServerConfig, SpecsConfig, TelemetryConfig};
use crate::ConfigError;

/// Complete Portcullis configuration.
///
/// # Example
///
/// ```
/// use portcullis_config::PortcullisConfig;
///
/// let config = PortcullisConfig::default();
/// assert_eq!(config.specs.file_suffix, "-oas.json");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortcullisConfig {
    /// Listener and upstream.
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAPI document source.
    #[serde(default)]
    pub specs: SpecsConfig,

    /// Authorization service.
    #[serde(default)]
    pub authz: AuthzConfig,

    /// Bearer token handling.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl PortcullisConfig {
    /// Debug logging, human-readable output.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = portcullis_telemetry::LogFormat::Pretty;
        config
    }

    /// Checks values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }
        check_url("server.upstream_url", &self.server.upstream_url)?;
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_body_bytes",
                "must be greater than 0",
            ));
        }

        if self.specs.dir.trim().is_empty() {
            return Err(ConfigError::invalid_value("specs.dir", "must not be empty"));
        }
        if self.specs.file_suffix.is_empty() {
            return Err(ConfigError::invalid_value(
                "specs.file_suffix",
                "must not be empty",
            ));
        }

        check_url("authz.endpoint", &self.authz.endpoint)?;
        if self.authz.timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "authz.timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.authz.subject_type.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "authz.subject_type",
                "must not be empty",
            ));
        }

        for (field, value) in [
            ("identity.scheme", &self.identity.scheme),
            ("identity.subject_claim", &self.identity.subject_claim),
            ("identity.roles_claim", &self.identity.roles_claim),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::invalid_value(field, "must not be empty"));
            }
        }
        if let Verification::Hs256 { secret } = &self.identity.verification {
            if secret.is_empty() {
                return Err(ConfigError::invalid_value(
                    "identity.verification.hs256.secret",
                    "must not be empty",
                ));
            }
        }

        if self.telemetry.logging.enabled {
            create_env_filter(&self.telemetry.logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::invalid_value(
            field,
            format!("expected an http(s) URL, got '{value}'"),
        )),
    }
}
