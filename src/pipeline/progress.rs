// file: src/pipeline/progress.rs
// description: progress tracking and statistics reporting for pipeline execution
// reference: uses indicatif for progress bars and tracks processing metrics

use crate::models::{DocumentResult, StageKind};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub documents_completed: usize,
    pub documents_failed: usize,
    pub failed_primary: usize,
    pub failed_post_processing: usize,
    pub model_invocations: u64,
    pub peak_in_flight: usize,
    pub duration_ms: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: &DocumentResult) {
        self.model_invocations += u64::from(result.attempts().total());

        match result.failed_stage() {
            None => self.documents_completed += 1,
            Some(stage) => {
                self.documents_failed += 1;
                match stage {
                    StageKind::Primary => self.failed_primary += 1,
                    StageKind::PostProcessing => self.failed_post_processing += 1,
                }
            }
        }
    }

    pub fn total_documents(&self) -> usize {
        self.documents_completed + self.documents_failed
    }

    pub fn documents_per_second(&self) -> f64 {
        if self.duration_ms == 0 {
            return 0.0;
        }
        self.total_documents() as f64 / (self.duration_ms as f64 / 1000.0)
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_documents();
        if total == 0 {
            return 0.0;
        }
        (self.documents_completed as f64 / total as f64) * 100.0
    }
}

pub struct ProgressTracker {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl ProgressTracker {
    pub fn with_color(total_documents: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();

        let main_bar = create_progress_bar(&multi_progress, total_documents as u64, colored);
        let detail_bar = create_detail_bar(&multi_progress);

        Self::from_bars(main_bar, detail_bar)
    }

    /// Tracker that counts but never draws.
    pub fn hidden() -> Self {
        Self::from_bars(ProgressBar::hidden(), ProgressBar::hidden())
    }

    fn from_bars(main_bar: ProgressBar, detail_bar: ProgressBar) -> Self {
        Self {
            main_bar,
            detail_bar,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    pub fn record(&self, result: &DocumentResult) {
        if result.is_completed() {
            self.completed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    /// Counts a document that was already completed by an earlier run.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.main_bar.inc(1);
        self.update_detail_bar();
    }

    pub fn finish(&self) {
        self.main_bar.finish_with_message("Ingestion complete");
        self.detail_bar.finish_and_clear();
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    fn update_detail_bar(&self) {
        let message = format!(
            "Completed: {} | Failed: {} | Skipped: {}",
            self.completed(),
            self.failed(),
            self.skipped()
        );

        self.detail_bar.set_message(message);
    }
}

impl Drop for ProgressTracker {
    fn drop(&mut self) {
        self.finish();
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}"
    };

    match ProgressStyle::default_bar().template(template) {
        Ok(style) => bar.set_style(style.progress_chars(if colored { "█▓▒░" } else { "=>-" })),
        Err(e) => tracing::warn!("Invalid progress bar template: {}", e),
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
        bar.set_style(style);
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::models::StageAttempts;
    use serde_json::json;

    fn completed(id: &str) -> DocumentResult {
        DocumentResult::Completed {
            document_id: id.to_string(),
            content_hash: String::new(),
            payload: json!({}),
            attempts: StageAttempts {
                primary: 1,
                post_processing: 2,
            },
        }
    }

    fn failed(id: &str, stage: StageKind) -> DocumentResult {
        DocumentResult::Failed {
            document_id: id.to_string(),
            content_hash: String::new(),
            stage,
            error: StageError::permanent("rejected"),
            attempts: StageAttempts {
                primary: 1,
                post_processing: 0,
            },
        }
    }

    #[test]
    fn test_pipeline_stats_calculations() {
        let mut stats = PipelineStats::new();
        stats.record(&completed("a"));
        stats.record(&failed("b", StageKind::Primary));
        stats.record(&failed("c", StageKind::PostProcessing));
        stats.record(&completed("d"));
        stats.duration_ms = 2_000;

        assert_eq!(stats.documents_completed, 2);
        assert_eq!(stats.documents_failed, 2);
        assert_eq!(stats.failed_primary, 1);
        assert_eq!(stats.failed_post_processing, 1);
        assert_eq!(stats.model_invocations, 8);
        assert_eq!(stats.documents_per_second(), 2.0);
        assert_eq!(stats.success_rate(), 50.0);
    }

    #[test]
    fn test_pipeline_stats_zero_duration() {
        let stats = PipelineStats::new();
        assert_eq!(stats.documents_per_second(), 0.0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_progress_tracker_counts() {
        let tracker = ProgressTracker::hidden();

        tracker.record(&completed("a"));
        tracker.record(&failed("b", StageKind::Primary));
        tracker.record(&failed("c", StageKind::Primary));

        assert_eq!(tracker.completed(), 1);
        assert_eq!(tracker.failed(), 2);
    }

    #[test]
    fn test_skipped_documents_advance_the_bar() {
        let tracker = ProgressTracker::hidden();

        tracker.record_skipped();
        tracker.record_skipped();
        tracker.record(&completed("c"));

        assert_eq!(tracker.skipped(), 2);
        assert_eq!(tracker.completed(), 1);
        assert_eq!(tracker.main_bar.position(), 3);
    }
}
