//! Loads a directory of OpenAPI documents into a [`PathIndex`].

use std::path::{Path, PathBuf};

use portcullis_router::PathIndex;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::compiler::{SpecCompiler, SpecOptions};
use crate::error::{SpecError, SpecResult};

/// Default document file suffix.
pub const DEFAULT_FILE_SUFFIX: &str = "-oas.json";

/// A document left out of the index.
#[derive(Debug)]
pub struct SkippedDocument {
    /// File that was skipped.
    pub file: PathBuf,
    /// Why.
    pub error: SpecError,
}

/// Outcome of loading a directory.
#[derive(Debug)]
pub struct LoadReport {
    /// The compiled index.
    pub index: PathIndex,
    /// Files compiled into the index, in load order.
    pub loaded: Vec<PathBuf>,
    /// Files rejected, with their errors.
    pub skipped: Vec<SkippedDocument>,
    /// Operations compiled across all loaded files.
    pub operations: usize,
}

impl LoadReport {
    /// Returns true if at least one document was rejected.
    pub fn has_failures(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Consumes the report, keeping the index.
    pub fn into_index(self) -> PathIndex {
        self.index
    }
}

/// Reads every matching document in a directory and compiles it.
///
/// # Example
///
/// ```ignore
/// use portcullis_spec::SpecLoader;
///
/// let report = SpecLoader::default().load_dir("/mnt/tyk-gateway/apps").await?;
/// for skipped in &report.skipped {
///     eprintln!("{}: {}", skipped.file.display(), skipped.error);
/// }
/// let index = report.into_index();
/// ```
#[derive(Debug, Clone)]
pub struct SpecLoader {
    options: SpecOptions,
    file_suffix: String,
}

impl Default for SpecLoader {
    fn default() -> Self {
        Self::new(SpecOptions::default())
    }
}

impl SpecLoader {
    /// Creates a loader with the default file suffix.
    pub fn new(options: SpecOptions) -> Self {
        Self {
            options,
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
        }
    }

    /// Sets the suffix a file name must end with to be loaded.
    pub fn with_file_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = suffix.into();
        self
    }

    /// The configured file suffix.
    pub fn file_suffix(&self) -> &str {
        &self.file_suffix
    }

    /// Loads all matching files of `dir`.
    ///
    /// Files are processed in name order so that merges between documents
    /// are reproducible. A file that cannot be read, parsed or compiled is
    /// reported in [`LoadReport::skipped`]; only a failure to list the
    /// directory itself is an error.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> SpecResult<LoadReport> {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "loading specifications");

        let mut files = self.list(dir).await?;
        files.sort();

        let mut compiler = SpecCompiler::new(self.options.clone());
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let result = match fs::read_to_string(&file).await {
                Ok(content) => compiler.add_document(&name, &content),
                Err(source) => Err(SpecError::Read {
                    file: file.clone(),
                    source,
                }),
            };

            match result {
                Ok(operations) => {
                    debug!(file = %name, operations, "loaded document");
                    loaded.push(file);
                }
                Err(error) => {
                    warn!(file = %name, error = %error, "skipping document");
                    skipped.push(SkippedDocument { file, error });
                }
            }
        }

        let operations = compiler.operation_count();
        let index = compiler.finish();
        info!(
            dir = %dir.display(),
            loaded = loaded.len(),
            skipped = skipped.len(),
            operations,
            nodes = index.node_count(),
            "specifications loaded"
        );

        Ok(LoadReport {
            index,
            loaded,
            skipped,
            operations,
        })
    }

    async fn list(&self, dir: &Path) -> SpecResult<Vec<PathBuf>> {
        let directory_error = |source| SpecError::Directory {
            dir: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir).await.map_err(directory_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(directory_error)? {
            let path = entry.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&self.file_suffix));
            if !matches {
                debug!(file = %path.display(), "skipped file");
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => {
                    debug!(file = %path.display(), "skipped directory");
                }
                _ => files.push(path),
            }
        }
        Ok(files)
    }
}
