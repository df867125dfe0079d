//! Portcullis Sidecar - authorizing reverse proxy
//!
//! The sidecar sits in front of a service and authorizes every request
//! against the `x-security` metadata of the service's OpenAPI documents
//! before forwarding it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Pod                                     │
//! │                                                                      │
//! │  ┌──────────────────────────┐          ┌──────────────────────────┐  │
//! │  │   Portcullis Sidecar     │   HTTP   │   Application Service    │  │
//! │  │                          │ ───────► │                          │  │
//! │  │  request id              │          │  business logic only     │  │
//! │  │  bearer token subject    │ ◄─────── │                          │  │
//! │  │  role gate               │          └──────────────────────────┘  │
//! │  │  permission checks ──────┼──────► SpiceDB HTTP API                │
//! │  └──────────────────────────┘                                        │
//! │           ▲          ▲                                               │
//! │           │          └── spec directory (*-oas.json), hot-reloaded   │
//! └───────────┼──────────────────────────────────────────────────────────┘
//!             │
//!         Ingress
//! ```
//!
//! # Internal endpoints
//!
//! - `/_portcullis/health` - liveness
//! - `/_portcullis/ready` - 200 once a route index is loaded
//! - `/_portcullis/metrics` - Prometheus text format
//! - `/_portcullis/version` - build version
//!
//! # Example Usage
//!
//! ```bash
//! $ portcullis-sidecar --config /etc/portcullis/sidecar.toml
//!
//! $ AUTHZED_ENDPOINT=http://spicedb:8443 \
//!   AUTHZED_BEARER_TOKEN=somerandomkeyhere \
//!   PORTCULLIS__SERVER__UPSTREAM_URL=http://localhost:3000 \
//!   portcullis-sidecar
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod headers;
pub mod health;
pub mod proxy;
pub mod reload;
pub mod server;

pub use error::{SidecarError, SidecarResult};
pub use health::{HealthChecker, HealthStatus, ReadinessStatus};
pub use proxy::{ProxyClient, ProxyRequest, ProxyResponse};
pub use reload::{ReloadSummary, SpecReloader};
pub use server::{shutdown_signal, SidecarServer, SidecarService, INTERNAL_PREFIX};

/// Sidecar version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
