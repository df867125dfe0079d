//! Configuration loader with layered approach.
//!
//! Layers, later overriding earlier:
//! 1. Default values
//! 2. Configuration file (TOML or JSON)
//! 3. Environment variables (`PORTCULLIS__SECTION__KEY`, plus
//!    `AUTHZED_ENDPOINT` / `AUTHZED_BEARER_TOKEN`)

use std::env;
use std::fs;
use std::path::Path;

use portcullis_core::Verification;
use portcullis_telemetry::LogFormat;
use tracing::debug;

use crate::schema::ConsistencyMode;
use crate::{ConfigError, PortcullisConfig};

/// Default environment prefix.
pub const DEFAULT_ENV_PREFIX: &str = "PORTCULLIS";

/// Alias for `authz.endpoint`.
pub const AUTHZED_ENDPOINT: &str = "AUTHZED_ENDPOINT";

/// Alias for `authz.bearer_token`.
pub const AUTHZED_BEARER_TOKEN: &str = "AUTHZED_BEARER_TOKEN";

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use portcullis_config::ConfigLoader;
///
/// # fn main() -> Result<(), portcullis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("portcullis.toml")?
///     .with_env_prefix("PORTCULLIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: PortcullisConfig,
    env_prefix: Option<String>,
    env_vars: Option<Vec<(String, String)>>,
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = PortcullisConfig::default();
        self
    }

    /// Start from the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = PortcullisConfig::development();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension (`.toml` or `.json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or names unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        debug!(file = %path.display(), "configuration file loaded");

        Ok(self)
    }

    /// Load a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use portcullis_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [authz]
    ///     endpoint = "http://spicedb:8443"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.authz.endpoint, "http://spicedb:8443");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Enable environment overrides under `prefix`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Read overrides from `vars` instead of the process environment.
    #[must_use]
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Load a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(file = %path.display(), "loaded .env");
        }
        self
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation fails.
    pub fn load(mut self) -> Result<PortcullisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars = self
                .env_vars
                .take()
                .unwrap_or_else(|| env::vars().collect());
            self.apply_env_overrides(&prefix, &vars)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> PortcullisConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<PortcullisConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str, vars: &[(String, String)]) -> Result<(), ConfigError> {
        // Aliases first so the prefixed form wins.
        for (key, value) in vars {
            match key.as_str() {
                AUTHZED_ENDPOINT if !value.is_empty() => {
                    self.config.authz.endpoint = value.clone();
                }
                AUTHZED_BEARER_TOKEN if !value.is_empty() => {
                    self.config.authz.bearer_token = Some(value.clone());
                }
                _ => {}
            }
        }

        let prefix = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(rest) = key.strip_prefix(&prefix) {
                self.apply_env_var(key, rest, value)?;
            }
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            // Server section
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "UPSTREAM_URL"] => config.server.upstream_url = value.to_string(),
            ["SERVER", "UPSTREAM_TIMEOUT_MS"] => {
                config.server.upstream_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "MAX_BODY_BYTES"] => {
                config.server.max_body_bytes = parse_number(key, value)?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }

            // Specs section
            ["SPECS", "DIR"] => config.specs.dir = value.to_string(),
            ["SPECS", "FILE_SUFFIX"] => config.specs.file_suffix = value.to_string(),
            ["SPECS", "GATEWAY_EXTENSION"] => config.specs.gateway_extension = value.to_string(),
            ["SPECS", "SECURITY_EXTENSION"] => config.specs.security_extension = value.to_string(),
            ["SPECS", "WATCH"] => config.specs.watch = parse_flag(key, value)?,
            ["SPECS", "DEBOUNCE_MS"] => config.specs.debounce_ms = parse_number(key, value)?,

            // Authorization service
            ["AUTHZ", "ENDPOINT"] => config.authz.endpoint = value.to_string(),
            ["AUTHZ", "BEARER_TOKEN"] => {
                config.authz.bearer_token = (!value.is_empty()).then(|| value.to_string());
            }
            ["AUTHZ", "TIMEOUT_MS"] => config.authz.timeout_ms = parse_number(key, value)?,
            ["AUTHZ", "SUBJECT_TYPE"] => config.authz.subject_type = value.to_string(),
            ["AUTHZ", "CONSISTENCY"] => {
                config.authz.consistency = match value.to_lowercase().as_str() {
                    "minimize_latency" => ConsistencyMode::MinimizeLatency,
                    "fully_consistent" => ConsistencyMode::FullyConsistent,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'minimize_latency' or 'fully_consistent'",
                        ))
                    }
                };
            }

            // Identity section
            ["IDENTITY", "SCHEME"] => config.identity.scheme = value.to_string(),
            ["IDENTITY", "SUBJECT_CLAIM"] => config.identity.subject_claim = value.to_string(),
            ["IDENTITY", "ROLES_CLAIM"] => config.identity.roles_claim = value.to_string(),
            ["IDENTITY", "VERIFICATION"] if value.eq_ignore_ascii_case("none") => {
                config.identity.verification = Verification::None;
            }
            ["IDENTITY", "VERIFICATION"] => {
                return Err(ConfigError::env_parse_error(
                    key,
                    "expected 'none'; set IDENTITY__HS256_SECRET to verify signatures",
                ))
            }
            ["IDENTITY", "HS256_SECRET"] => {
                config.identity.verification = Verification::Hs256 {
                    secret: value.to_string(),
                };
            }

            // Telemetry
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = value
                    .parse::<LogFormat>()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'json' or 'pretty'"))?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_flag(key, value)?;
            }

            _ => debug!(var = key, "ignoring unknown configuration variable"),
        }

        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
