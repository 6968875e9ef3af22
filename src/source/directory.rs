// file: src/source/directory.rs
// description: directory walking and lazy document loading with filtering
// reference: https://docs.rs/walkdir

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::models::Document;
use crate::utils::Validator;
use futures::stream::{self, Stream, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub size: u64,
}

/// Finds documents under `source.input_dir` and loads them on demand.
pub struct DirectorySource {
    config: SourceConfig,
}

impl DirectorySource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.input_dir
    }

    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        let root = self.root();
        Validator::validate_directory(root).map_err(|e| PipelineError::Source(e.to_string()))?;

        info!("Scanning directory: {}", root.display());
        let max_size = (self.config.max_file_size_mb as u64) * 1024 * 1024;
        let mut files = Vec::new();

        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();

            if self.should_skip(path) || !self.has_wanted_extension(path) {
                debug!("Skipping file: {}", path.display());
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > max_size {
                debug!(
                    "Skipping large file ({} MB): {}",
                    size / 1024 / 1024,
                    path.display()
                );
                continue;
            }

            // Used verbatim as the document id; distinct files keep distinct ids.
            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned();

            files.push(ScannedFile {
                path: path.to_path_buf(),
                relative_path,
                size,
            });
        }

        info!("Found {} documents", files.len());
        Ok(files)
    }

    /// Reads each file only when the consumer pulls the next document.
    ///
    /// A file that cannot be read still yields a document, marked unreadable.
    pub fn documents(files: Vec<ScannedFile>) -> impl Stream<Item = Document> {
        stream::iter(files).then(|file| async move {
            match tokio::fs::read(&file.path).await {
                Ok(bytes) => Document::from_file(file.relative_path, &file.path, bytes),
                Err(e) => {
                    warn!("Cannot read {}: {}", file.path.display(), e);
                    Document::unreadable(file.relative_path, &file.path, e.to_string())
                }
            }
        })
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        if self.config.extensions.is_empty() {
            return true;
        }

        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    fn should_skip(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        for pattern in &self.config.skip_patterns {
            if let Some(suffix) = pattern.strip_prefix('*') {
                if path_str.ends_with(suffix) {
                    return true;
                }
            } else if let Some(prefix) = pattern.strip_suffix("/*") {
                if path.components().any(|c| c.as_os_str() == prefix) {
                    return true;
                }
            } else if path_str.contains(pattern.as_str()) {
                return true;
            }
        }

        false
    }
}
