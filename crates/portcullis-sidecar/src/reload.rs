//! Loading the spec directory into the live route index.
//!
//! A reload compiles the whole directory into a fresh index and swaps it in
//! with [`IndexHandle::store`]. Requests already being authorized keep the
//! snapshot they started with. Once an index is live, a reload in which any
//! document fails keeps the previous index, so a file caught mid-write never
//! drops its routes. If the directory cannot be read at all the previous
//! index also stays in place.

use std::path::PathBuf;
use std::sync::Arc;

use portcullis_authz::IndexHandle;
use portcullis_config::{SpecWatcher, SpecWatcherConfig, SpecsConfig};
use portcullis_spec::{SpecLoader, SpecOptions};
use portcullis_telemetry::metrics::record_index_reload;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::SidecarResult;
use crate::health::HealthChecker;

/// Result of one successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadSummary {
    /// Live index generation after the reload.
    pub generation: u64,
    /// Whether the compiled index replaced the live one.
    pub swapped: bool,
    /// Documents compiled into the index.
    pub loaded: usize,
    /// Documents rejected.
    pub skipped: usize,
    /// Operations compiled.
    pub operations: usize,
}

/// Rebuilds the route index from the spec directory.
#[derive(Debug, Clone)]
pub struct SpecReloader {
    loader: SpecLoader,
    dir: PathBuf,
    index: IndexHandle,
    health: Arc<HealthChecker>,
}

impl SpecReloader {
    /// Create a reloader for `dir`.
    pub fn new(
        loader: SpecLoader,
        dir: impl Into<PathBuf>,
        index: IndexHandle,
        health: Arc<HealthChecker>,
    ) -> Self {
        Self {
            loader,
            dir: dir.into(),
            index,
            health,
        }
    }

    /// Create a reloader from the `[specs]` section.
    pub fn from_config(config: &SpecsConfig, index: IndexHandle, health: Arc<HealthChecker>) -> Self {
        let options = SpecOptions::default()
            .with_gateway_extension(config.gateway_extension.as_str())
            .with_security_extension(config.security_extension.as_str());
        let loader = SpecLoader::new(options).with_file_suffix(config.file_suffix.as_str());
        Self::new(loader, config.dir.as_str(), index, health)
    }

    /// The watched directory.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Compile the directory and swap the result in.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed; the current index
    /// is left untouched in that case. Individual bad documents are skipped
    /// and counted, not returned as errors. The first load swaps in whatever
    /// compiled; later loads with skipped documents do not swap.
    pub async fn reload(&self) -> SidecarResult<ReloadSummary> {
        let report = match self.loader.load_dir(&self.dir).await {
            Ok(report) => report,
            Err(e) => {
                record_index_reload(false);
                self.health.record_reload(false);
                return Err(e.into());
            }
        };

        let clean = !report.has_failures();
        let loaded = report.loaded.len();
        let skipped = report.skipped.len();
        let operations = report.operations;
        record_index_reload(clean);
        self.health.record_reload(clean);

        if !clean && self.index.is_loaded() {
            let generation = self.index.generation();
            warn!(generation, loaded, skipped, "documents failed to load, keeping previous index");
            return Ok(ReloadSummary {
                generation,
                swapped: false,
                loaded,
                skipped,
                operations,
            });
        }

        let generation = self.index.store(report.into_index());
        info!(generation, loaded, skipped, operations, "route index swapped");

        Ok(ReloadSummary {
            generation,
            swapped: true,
            loaded,
            skipped,
            operations,
        })
    }

    /// Reload on every batch of changes until the watcher stops.
    pub async fn watch(self, mut watcher: SpecWatcher) {
        while let Some(change) = watcher.next().await {
            info!(
                files = change.paths.len(),
                kind = ?change.last_kind,
                "spec directory changed"
            );
            if let Err(e) = self.reload().await {
                warn!(error = %e, dir = %self.dir.display(), "reload failed, keeping previous index");
            }
        }
        warn!(dir = %self.dir.display(), "spec watcher stopped");
    }

    /// Start watching the directory in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the file watcher cannot be created.
    pub fn spawn_watcher(self, config: &SpecsConfig) -> SidecarResult<JoinHandle<()>> {
        let watcher = SpecWatcher::new(
            SpecWatcherConfig::new(self.dir.clone())
                .with_file_suffix(config.file_suffix.as_str())
                .with_debounce(config.debounce()),
        )?;
        Ok(tokio::spawn(self.watch(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DOCUMENT: &str = r#"{
      "openapi": "3.0.3",
      "paths": {
        "/things/{id}": {
          "get": {
            "parameters": [
              {"name": "id", "in": "path", "x-security": {"resource": "thing", "permission": "read"}}
            ]
          }
        }
      },
      "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/api/", "strip": true}}}
    }"#;

    fn reloader(dir: &TempDir) -> (SpecReloader, IndexHandle, Arc<HealthChecker>) {
        let index = IndexHandle::empty();
        let health = Arc::new(HealthChecker::new(index.clone()));
        let config = SpecsConfig {
            dir: dir.path().display().to_string(),
            ..SpecsConfig::default()
        };
        (
            SpecReloader::from_config(&config, index.clone(), Arc::clone(&health)),
            index,
            health,
        )
    }

    #[tokio::test]
    async fn test_reload_swaps_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("things-oas.json"), DOCUMENT).unwrap();
        let (reloader, index, health) = reloader(&dir);

        assert!(!index.is_loaded());
        let summary = reloader.reload().await.unwrap();

        assert_eq!(summary.generation, 1);
        assert!(summary.swapped);
        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped, 0);
        assert!(index.load().find("GET", "/api/things/7").is_some());
        assert!(health.readiness().status.is_ready());
    }

    #[tokio::test]
    async fn test_bad_document_on_first_load_degrades_but_swaps() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("things-oas.json"), DOCUMENT).unwrap();
        fs::write(dir.path().join("broken-oas.json"), "{ not json").unwrap();
        fs::write(dir.path().join("ignored.json"), "{ not json").unwrap();
        let (reloader, index, health) = reloader(&dir);

        let summary = reloader.reload().await.unwrap();

        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.swapped);
        assert!(index.is_loaded());
        assert_eq!(
            health.liveness().status,
            crate::health::HealthStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_corrupted_document_keeps_its_routes_restricted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("things-oas.json"), DOCUMENT).unwrap();
        fs::write(dir.path().join("widgets-oas.json"), DOCUMENT.replace("things", "widgets")).unwrap();
        let (reloader, index, health) = reloader(&dir);
        reloader.reload().await.unwrap();
        assert!(index.load().find("GET", "/api/widgets/1").is_some());

        fs::write(dir.path().join("widgets-oas.json"), "{ \"openapi\": ").unwrap();
        let summary = reloader.reload().await.unwrap();

        assert!(!summary.swapped);
        assert_eq!(summary.generation, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(index.generation(), 1);
        let live = index.load();
        let matched = live.find("GET", "/api/widgets/1").unwrap();
        assert!(!matched.is_unrestricted());
        assert_eq!(
            health.liveness().status,
            crate::health::HealthStatus::Degraded
        );

        fs::write(dir.path().join("widgets-oas.json"), DOCUMENT.replace("things", "widgets")).unwrap();
        let summary = reloader.reload().await.unwrap();
        assert!(summary.swapped);
        assert_eq!(summary.generation, 2);
        assert_eq!(health.liveness().status, crate::health::HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_missing_directory_keeps_previous_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("things-oas.json"), DOCUMENT).unwrap();
        let (reloader, index, _health) = reloader(&dir);
        reloader.reload().await.unwrap();

        let gone = SpecReloader::new(
            SpecLoader::default(),
            dir.path().join("missing"),
            index.clone(),
            Arc::new(HealthChecker::new(index.clone())),
        );
        assert!(gone.reload().await.is_err());
        assert_eq!(index.generation(), 1);
        assert!(index.load().find("GET", "/api/things/7").is_some());
    }
}
