// file: src/utils/validation.rs
// description: data validation utilities and helpers
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use std::fs;
use std::path::Path;

pub struct Validator;

impl Validator {
    /// A weights file must resolve to a non-empty regular file.
    pub fn validate_weights_file(path: &Path) -> Result<()> {
        let canonical = fs::canonicalize(path).map_err(|e| {
            PipelineError::Validation(format!(
                "Cannot canonicalize path {}: {}",
                path.display(),
                e
            ))
        })?;

        let metadata = fs::metadata(&canonical).map_err(|source| PipelineError::FileOperation {
            path: canonical.clone(),
            source,
        })?;

        if !metadata.is_file() {
            return Err(PipelineError::Validation(format!(
                "Path is not a file: {}",
                canonical.display()
            )));
        }

        if metadata.len() == 0 {
            return Err(PipelineError::Validation(format!(
                "Weights file is empty: {}",
                canonical.display()
            )));
        }

        Ok(())
    }

    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(PipelineError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Dataset ids become file names, so separators and dot-only names are refused.
    pub fn validate_dataset_id(dataset_id: &str) -> Result<()> {
        let trimmed = dataset_id.trim();
        if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
            return Err(PipelineError::Validation(format!(
                "Invalid dataset id: {:?}",
                dataset_id
            )));
        }

        if trimmed.contains(['/', '\\']) {
            return Err(PipelineError::Validation(format!(
                "Dataset id must not contain path separators: {}",
                dataset_id
            )));
        }

        Ok(())
    }

    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            None => text.to_string(),
            Some((cut, _)) => format!("{}...", &text[..cut]),
        }
    }
}
