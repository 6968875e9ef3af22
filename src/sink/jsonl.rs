// file: src/sink/jsonl.rs
// description: json-lines result file with resume support and a run manifest
// reference: json export utilities

use crate::config::OutputConfig;
use crate::error::{PipelineError, Result};
use crate::models::DocumentResult;
use crate::pipeline::PipelineStats;
use crate::sink::ResultSink;
use crate::utils::Validator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFingerprint {
    pub stage: String,
    pub name: String,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub dataset_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub results_file: PathBuf,
    pub resumed: bool,
    pub duplicates_skipped: usize,
    pub models: Vec<ModelFingerprint>,
    pub stats: PipelineStats,
}

#[derive(Serialize)]
struct ResultRecord<'a> {
    dataset_id: &'a str,
    run_id: Uuid,
    recorded_at: String,
    #[serde(flatten)]
    result: &'a DocumentResult,
}

/// Appends one JSON object per result to `<result_dir>/<dataset_id>.jsonl`.
///
/// With `resume` enabled, completed results already in the file are loaded at
/// open time and offered results matching them (same id and content hash) are
/// skipped. Failed results are never treated as done.
///
/// The file is only touched once the first result arrives or the run
/// finishes, so a run that aborts early leaves earlier output intact.
pub struct JsonlSink {
    results_path: PathBuf,
    manifest_path: PathBuf,
    dataset_id: String,
    run_id: Uuid,
    started_at: String,
    resumed: bool,
    writer: Option<BufWriter<File>>,
    /// Bytes of the existing file kept when the writer opens.
    keep_bytes: u64,
    completed: HashMap<String, String>,
    duplicates_skipped: usize,
    models: Vec<ModelFingerprint>,
}

impl JsonlSink {
    pub fn open(config: &OutputConfig, run_id: Uuid) -> Result<Self> {
        Validator::validate_dataset_id(&config.dataset_id)?;
        fs::create_dir_all(&config.result_dir).map_err(|source| PipelineError::FileOperation {
            path: config.result_dir.clone(),
            source,
        })?;

        let results_path = config
            .result_dir
            .join(format!("{}.jsonl", config.dataset_id));
        let manifest_path = config
            .result_dir
            .join(format!("{}.manifest.json", config.dataset_id));

        let (completed, keep_bytes) = if config.resume && results_path.exists() {
            let (completed, keep_bytes) = Self::load_completed(&results_path)?;
            info!(
                "Resuming dataset {}: {} completed results on record",
                config.dataset_id,
                completed.len()
            );
            (completed, keep_bytes)
        } else {
            (HashMap::new(), 0)
        };

        Ok(Self {
            results_path,
            manifest_path,
            dataset_id: config.dataset_id.clone(),
            run_id,
            started_at: Utc::now().to_rfc3339(),
            resumed: config.resume,
            writer: None,
            keep_bytes,
            completed,
            duplicates_skipped: 0,
            models: Vec::new(),
        })
    }

    pub fn with_models(mut self, models: Vec<ModelFingerprint>) -> Self {
        self.models = models;
        self
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Completed document ids from earlier runs, mapped to their content hash.
    pub fn completed(&self) -> &HashMap<String, String> {
        &self.completed
    }

    pub fn is_completed(&self, document_id: &str, content_hash: &str) -> bool {
        self.completed
            .get(document_id)
            .is_some_and(|hash| hash == content_hash)
    }

    /// Reads completed results and the length of the file up to its last
    /// complete line.
    fn load_completed(path: &Path) -> Result<(HashMap<String, String>, u64)> {
        let file = File::open(path).map_err(|source| PipelineError::FileOperation {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = BufReader::new(file);
        let mut completed = HashMap::new();
        let mut complete_bytes = 0u64;
        let mut line = Vec::new();
        let mut index = 0;

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }
            index += 1;

            if line.last() != Some(&b'\n') {
                // A crash mid-write leaves a partial last line; it is cut off
                // before new records are appended.
                warn!("Dropping partial record at line {}", index);
                break;
            }
            complete_bytes += read as u64;

            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let record: serde_json::Value = match serde_json::from_slice(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Ignoring unreadable record at line {}: {}", index, e);
                    continue;
                }
            };

            if record["status"] != "completed" {
                continue;
            }

            if let (Some(id), Some(hash)) = (
                record["document_id"].as_str(),
                record["content_hash"].as_str(),
            ) {
                completed.insert(id.to_string(), hash.to_string());
            }
        }

        Ok((completed, complete_bytes))
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open_writer()?,
        };
        Ok(self.writer.insert(writer))
    }

    fn open_writer(&self) -> Result<BufWriter<File>> {
        let file_error = |source: std::io::Error| PipelineError::FileOperation {
            path: self.results_path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.results_path)
            .map_err(file_error)?;
        file.set_len(self.keep_bytes).map_err(file_error)?;

        let mut writer = BufWriter::new(file);
        writer.seek(SeekFrom::End(0)).map_err(file_error)?;
        debug!(
            "Opened {} keeping {} bytes",
            self.results_path.display(),
            self.keep_bytes
        );
        Ok(writer)
    }
}

impl ResultSink for JsonlSink {
    fn accept(&mut self, result: &DocumentResult) -> Result<bool> {
        if result.is_completed() && self.is_completed(result.document_id(), result.content_hash())
        {
            debug!("Skipping already recorded result for {}", result.document_id());
            self.duplicates_skipped += 1;
            return Ok(false);
        }

        let record = ResultRecord {
            dataset_id: &self.dataset_id,
            run_id: self.run_id,
            recorded_at: Utc::now().to_rfc3339(),
            result,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let writer = self.writer()?;
        writer.write_all(&line)?;
        writer.flush()?;
        Ok(true)
    }

    fn finish(&mut self, stats: &PipelineStats) -> Result<()> {
        self.writer()?.flush()?;

        let manifest = RunManifest {
            run_id: self.run_id,
            dataset_id: self.dataset_id.clone(),
            started_at: self.started_at.clone(),
            finished_at: Utc::now().to_rfc3339(),
            results_file: self.results_path.clone(),
            resumed: self.resumed,
            duplicates_skipped: self.duplicates_skipped,
            models: self.models.clone(),
            stats: stats.clone(),
        };

        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&self.manifest_path, json).map_err(|source| PipelineError::FileOperation {
            path: self.manifest_path.clone(),
            source,
        })?;

        info!("Run manifest written to {}", self.manifest_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::models::{StageAttempts, StageKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    fn output_config(dir: &Path, resume: bool) -> OutputConfig {
        OutputConfig {
            result_dir: dir.to_path_buf(),
            dataset_id: "covid_docs".to_string(),
            resume,
        }
    }

    fn completed(id: &str, hash: &str) -> DocumentResult {
        DocumentResult::Completed {
            document_id: id.to_string(),
            content_hash: hash.to_string(),
            payload: json!({"objects": []}),
            attempts: StageAttempts {
                primary: 1,
                post_processing: 1,
            },
        }
    }

    fn failed(id: &str, hash: &str) -> DocumentResult {
        DocumentResult::Failed {
            document_id: id.to_string(),
            content_hash: hash.to_string(),
            stage: StageKind::Primary,
            error: StageError::permanent("rejected"),
            attempts: StageAttempts {
                primary: 1,
                post_processing: 0,
            },
        }
    }

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_records_are_tagged_with_dataset() {
        let dir = tempdir().unwrap();
        let mut sink = JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();

        assert!(sink.accept(&completed("a.pdf", "h1")).unwrap());
        assert!(sink.accept(&failed("b.pdf", "h2")).unwrap());

        let lines = read_lines(sink.results_path());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["dataset_id"], "covid_docs");
        assert_eq!(lines[0]["status"], "completed");
        assert_eq!(lines[1]["stage"], "primary");
        assert_eq!(lines[1]["error"]["kind"], "permanent");
    }

    #[test]
    fn test_resume_skips_completed_but_retries_failed() {
        let dir = tempdir().unwrap();
        {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
            sink.accept(&completed("a.pdf", "h1")).unwrap();
            sink.accept(&failed("b.pdf", "h2")).unwrap();
        }

        let mut sink = JsonlSink::open(&output_config(dir.path(), true), Uuid::new_v4()).unwrap();
        assert!(sink.is_completed("a.pdf", "h1"));
        assert!(!sink.is_completed("b.pdf", "h2"));

        assert!(!sink.accept(&completed("a.pdf", "h1")).unwrap());
        assert!(sink.accept(&completed("b.pdf", "h2")).unwrap());
        // Changed content is new work.
        assert!(sink.accept(&completed("a.pdf", "h9")).unwrap());

        assert_eq!(read_lines(sink.results_path()).len(), 4);
    }

    #[test]
    fn test_fresh_run_truncates_previous_results() {
        let dir = tempdir().unwrap();
        {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
            sink.accept(&completed("a.pdf", "h1")).unwrap();
        }

        let mut sink = JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
        assert!(sink.completed().is_empty());
        sink.accept(&completed("c.pdf", "h3")).unwrap();

        let lines = read_lines(sink.results_path());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["document_id"], "c.pdf");
    }

    #[test]
    fn test_aborted_run_keeps_previous_results() {
        let dir = tempdir().unwrap();
        let results_path = {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
            sink.accept(&completed("a.pdf", "h1")).unwrap();
            sink.results_path().to_path_buf()
        };
        let before = fs::read(&results_path).unwrap();

        // Opened, then dropped before any result, as when the source fails to scan.
        drop(JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap());

        assert_eq!(fs::read(&results_path).unwrap(), before);
    }

    #[test]
    fn test_finish_without_results_empties_fresh_run() {
        let dir = tempdir().unwrap();
        {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
            sink.accept(&completed("a.pdf", "h1")).unwrap();
        }

        let mut sink = JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
        sink.finish(&PipelineStats::new()).unwrap();
        assert_eq!(fs::read_to_string(sink.results_path()).unwrap(), "");
    }

    #[test]
    fn test_resume_cuts_partial_last_line() {
        let dir = tempdir().unwrap();
        let results_path = {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), false), Uuid::new_v4()).unwrap();
            sink.accept(&completed("a.pdf", "h1")).unwrap();
            sink.results_path().to_path_buf()
        };
        let mut file = OpenOptions::new().append(true).open(&results_path).unwrap();
        file.write_all(br#"{"status":"comp"#).unwrap();
        drop(file);

        {
            let mut sink =
                JsonlSink::open(&output_config(dir.path(), true), Uuid::new_v4()).unwrap();
            assert!(sink.is_completed("a.pdf", "h1"));
            assert!(sink.accept(&completed("b.pdf", "h2")).unwrap());
        }

        let sink = JsonlSink::open(&output_config(dir.path(), true), Uuid::new_v4()).unwrap();
        assert!(sink.is_completed("a.pdf", "h1"));
        assert!(sink.is_completed("b.pdf", "h2"));

        let lines = read_lines(&results_path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["document_id"], "b.pdf");
    }

    #[test]
    fn test_finish_writes_manifest() {
        let dir = tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let mut sink = JsonlSink::open(&output_config(dir.path(), false), run_id)
            .unwrap()
            .with_models(vec![ModelFingerprint {
                stage: "primary".to_string(),
                name: "primary".to_string(),
                fingerprint: Some("abc".to_string()),
            }]);

        let result = completed("a.pdf", "h1");
        sink.accept(&result).unwrap();
        let mut stats = PipelineStats::new();
        stats.record(&result);
        sink.finish(&stats).unwrap();

        let manifest: RunManifest =
            serde_json::from_str(&fs::read_to_string(sink.manifest_path()).unwrap()).unwrap();
        assert_eq!(manifest.run_id, run_id);
        assert_eq!(manifest.stats, stats);
        assert_eq!(manifest.models.len(), 1);
    }

    #[test]
    fn test_invalid_dataset_id_rejected() {
        let dir = tempdir().unwrap();
        let mut config = output_config(dir.path(), false);
        config.dataset_id = "../escape".to_string();
        assert!(JsonlSink::open(&config, Uuid::new_v4()).is_err());
    }
}
