//! Portcullis Sidecar - Entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use portcullis_authz::IndexHandle;
use portcullis_config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use portcullis_sidecar::{HealthChecker, SidecarServer, SidecarService, SpecReloader};
use portcullis_telemetry::init_telemetry;
use tracing::{info, warn};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("portcullis-sidecar {}", portcullis_sidecar::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Portcullis Sidecar - authorizing reverse proxy

USAGE:
    portcullis-sidecar [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    AUTHZED_ENDPOINT                      Authorization service URL
    AUTHZED_BEARER_TOKEN                  Authorization service pre-shared key
    PORTCULLIS__SERVER__HTTP_ADDR         Listen address (default: 0.0.0.0:8080)
    PORTCULLIS__SERVER__UPSTREAM_URL      Upstream service URL
    PORTCULLIS__SPECS__DIR                OpenAPI document directory
    PORTCULLIS__SPECS__WATCH              Reload on document changes (default: true)
    PORTCULLIS__IDENTITY__HS256_SECRET    Verify bearer tokens with this secret
    RUST_LOG                              Log filter, overrides the configured level

EXAMPLES:
    # Run with configuration file
    portcullis-sidecar --config /etc/portcullis/sidecar.toml

    # Run with environment variables
    AUTHZED_ENDPOINT=http://spicedb:8443 portcullis-sidecar
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_dotenv();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    let config = loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_telemetry(&config.telemetry.to_telemetry_config())
        .context("failed to initialize telemetry")?;

    info!(
        version = portcullis_sidecar::VERSION,
        listen = %config.server.http_addr,
        upstream = %config.server.upstream_url,
        authz = %config.authz.endpoint,
        "starting portcullis sidecar"
    );

    let index = IndexHandle::empty();
    let health = Arc::new(HealthChecker::new(index.clone()));

    let reloader = SpecReloader::from_config(&config.specs, index.clone(), Arc::clone(&health));
    let summary = reloader
        .reload()
        .await
        .with_context(|| format!("failed to load specifications from {}", config.specs.dir))?;
    info!(
        documents = summary.loaded,
        skipped = summary.skipped,
        operations = summary.operations,
        "route index ready"
    );

    if config.specs.watch {
        if let Err(e) = reloader.spawn_watcher(&config.specs) {
            warn!(error = %e, "spec hot-reload disabled");
        }
    }

    let service = SidecarService::from_config(&config, index, health)?;
    SidecarServer::new(&config.server, service)?.run().await?;

    Ok(())
}
