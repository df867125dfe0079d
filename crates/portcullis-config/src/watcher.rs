//! Spec directory watching for index hot-reload.
//!
//! [`SpecWatcher`] reports batches of changed document files. Bursts of file
//! system events (editors and `kubectl cp` write in several steps) are
//! coalesced: after the first relevant event the watcher keeps collecting
//! until the directory has been quiet for the debounce window.
//!
//! # Example
//!
//! ```no_run
//! use portcullis_config::{SpecWatcher, SpecWatcherConfig};
//!
//! # async fn example() -> Result<(), portcullis_config::ConfigError> {
//! let mut watcher = SpecWatcher::new(SpecWatcherConfig::new("/mnt/tyk-gateway/apps"))?;
//! while let Some(change) = watcher.next().await {
//!     println!("{} document(s) changed", change.paths.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ConfigError;

/// Kind of file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    /// File was created.
    Created,
    /// File was modified.
    Modified,
    /// File was deleted.
    Deleted,
}

impl FileChangeKind {
    fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(Self::Created),
            EventKind::Modify(_) => Some(Self::Modified),
            EventKind::Remove(_) => Some(Self::Deleted),
            EventKind::Access(_) | EventKind::Other | EventKind::Any => None,
        }
    }
}

/// A debounced batch of document changes.
#[derive(Debug, Clone)]
pub struct SpecDirChange {
    /// Changed document files, deduplicated, in arrival order.
    pub paths: Vec<PathBuf>,
    /// Kind of the most recent change seen.
    pub last_kind: FileChangeKind,
    /// When the first change of the batch arrived.
    pub first_seen: Instant,
}

impl SpecDirChange {
    fn push(&mut self, path: PathBuf, kind: FileChangeKind) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
        self.last_kind = kind;
    }
}

/// Configuration for [`SpecWatcher`].
#[derive(Debug, Clone)]
pub struct SpecWatcherConfig {
    /// Directory to watch (not recursive).
    pub dir: PathBuf,
    /// Only file names ending with this suffix count.
    pub file_suffix: String,
    /// Quiet period that closes a batch.
    pub debounce: Duration,
}

impl SpecWatcherConfig {
    /// Watch `dir` for `-oas.json` files with a 500ms debounce.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_suffix: "-oas.json".to_string(),
            debounce: Duration::from_millis(500),
        }
    }

    /// Set the file name suffix.
    #[must_use]
    pub fn with_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = suffix.into();
        self
    }

    /// Set the debounce window.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Watches a spec directory.
pub struct SpecWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Event>,
    config: SpecWatcherConfig,
}

impl std::fmt::Debug for SpecWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecWatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SpecWatcher {
    /// Start watching.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or cannot be watched.
    pub fn new(config: SpecWatcherConfig) -> Result<Self, ConfigError> {
        if !config.dir.is_dir() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("spec directory does not exist: {}", config.dir.display()),
            )));
        }

        let (tx, rx) = mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                // Runs on the notify thread; a closed channel means the watcher is shutting down.
                Ok(event) => {
                    let _ = tx.blocking_send(event);
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })
        .map_err(|e| ConfigError::watch(format!("failed to create file watcher: {e}")))?;

        watcher
            .watch(&config.dir, RecursiveMode::NonRecursive)
            .map_err(|e| {
                ConfigError::watch(format!("failed to watch {}: {e}", config.dir.display()))
            })?;
        debug!(dir = %config.dir.display(), suffix = %config.file_suffix, "watching spec directory");

        Ok(Self {
            _watcher: watcher,
            rx,
            config,
        })
    }

    /// The watcher settings.
    pub fn config(&self) -> &SpecWatcherConfig {
        &self.config
    }

    /// Wait for the next batch of changes.
    ///
    /// Returns `None` once the underlying watcher has stopped.
    pub async fn next(&mut self) -> Option<SpecDirChange> {
        let mut change = loop {
            let event = self.rx.recv().await?;
            let mut relevant = relevant_paths(&event, &self.config.file_suffix).into_iter();
            if let Some((path, kind)) = relevant.next() {
                let mut change = SpecDirChange {
                    paths: vec![path],
                    last_kind: kind,
                    first_seen: Instant::now(),
                };
                for (path, kind) in relevant {
                    change.push(path, kind);
                }
                break change;
            }
        };

        loop {
            match tokio::time::timeout(self.config.debounce, self.rx.recv()).await {
                Ok(Some(event)) => {
                    for (path, kind) in relevant_paths(&event, &self.config.file_suffix) {
                        change.push(path, kind);
                    }
                }
                Ok(None) | Err(_) => return Some(change),
            }
        }
    }
}

/// Document paths touched by `event`.
fn relevant_paths(event: &Event, suffix: &str) -> Vec<(PathBuf, FileChangeKind)> {
    let Some(kind) = FileChangeKind::from_event_kind(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .filter(|p| has_suffix(p, suffix))
        .map(|p| (p.clone(), kind))
        .collect()
}

fn has_suffix(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix))
}
