//! Typed configuration for Portcullis.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//! - Spec directory watching for index hot-reload
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! upstream_url = "http://127.0.0.1:3000"
//! max_body_bytes = 10485760
//!
//! [specs]
//! dir = "/mnt/tyk-gateway/apps"
//! file_suffix = "-oas.json"
//! watch = true
//!
//! [authz]
//! endpoint = "http://spicedb:8443"
//! bearer_token = "somerandomkeyhere"
//! consistency = "minimize_latency"
//!
//! [identity]
//! subject_claim = "userId"
//! roles_claim = "roles"
//! verification = "none"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `PORTCULLIS__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `PORTCULLIS__SPECS__WATCH=false`
//! - `PORTCULLIS__IDENTITY__HS256_SECRET=...`
//! - `AUTHZED_ENDPOINT` and `AUTHZED_BEARER_TOKEN` set the authorization
//!   service connection.

#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;
mod watcher;

pub use config::PortcullisConfig;
pub use error::ConfigError;
pub use loader::{ConfigLoader, AUTHZED_BEARER_TOKEN, AUTHZED_ENDPOINT, DEFAULT_ENV_PREFIX};
pub use schema::{
    AuthzConfig, ConsistencyMode, IdentityConfig, LoggingConfig, MetricsConfig, ServerConfig,
    SpecsConfig, TelemetryConfig,
};
pub use watcher::{FileChangeKind, SpecDirChange, SpecWatcher, SpecWatcherConfig};
