// file: src/pipeline/coordinator.rs
// description: drives every document through the primary and post-processing stages
// reference: orchestrates asynchronous ingestion workflow

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{Document, DocumentResult, StageAttempts, StageInput, StageKind, StageOutput};
use crate::pipeline::progress::{PipelineStats, ProgressTracker};
use crate::pipeline::state::{DocumentLifecycle, DocumentState};
use crate::runtime::ModelPair;
use crate::sink::ResultSink;
use crate::stage::StageExecutor;
use futures::stream::{Stream, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Live in-flight accounting shared by every run on a coordinator.
#[derive(Debug, Default)]
pub struct RunCounters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    started: AtomicUsize,
}

impl RunCounters {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

struct InFlightGuard<'a>(&'a RunCounters);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct PipelineCoordinator {
    primary: StageExecutor,
    post_processing: StageExecutor,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    stop: CancellationToken,
    counters: RunCounters,
}

impl PipelineCoordinator {
    pub fn new(models: &ModelPair, config: &PipelineConfig) -> Self {
        let max_concurrent = config.max_concurrent_documents.max(1);

        Self {
            primary: StageExecutor::new(StageKind::Primary, models.primary.clone(), config),
            post_processing: StageExecutor::new(
                StageKind::PostProcessing,
                models.post_processing.clone(),
                config,
            ),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            stop: CancellationToken::new(),
            counters: RunCounters::default(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    /// Token that, once cancelled, stops new documents from starting.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("Stop requested, draining in-flight documents");
        }
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Lazily maps documents to results, at most `max_concurrent_documents` at a time.
    ///
    /// Results arrive in completion order. The stream ends once the input ends
    /// (or a stop is requested) and every started document has resolved.
    pub fn process<'a, S>(&'a self, documents: S) -> impl Stream<Item = DocumentResult> + 'a
    where
        S: Stream<Item = Document> + 'a,
    {
        documents
            .take_until(self.stop.clone().cancelled_owned())
            .map(move |document| self.process_document(document))
            .buffer_unordered(self.max_concurrent)
    }

    /// Runs one document through both stages; always yields a result.
    pub async fn process_document(&self, document: Document) -> DocumentResult {
        let _slot = self.slots.acquire().await.ok();
        let _in_flight = self.counters.enter();

        let document = Arc::new(document);
        let document_id = document.id().to_string();
        let content_hash = document.content_hash().to_string();
        let mut lifecycle = DocumentLifecycle::new(&document_id);
        let mut attempts = StageAttempts::default();

        lifecycle.advance(DocumentState::PrimaryRunning);
        let primary = self.primary.run(StageInput::primary(document.clone())).await;
        attempts.primary = primary.attempts();

        let primary_payload = match primary {
            StageOutput::Success { payload, .. } => {
                lifecycle.advance(DocumentState::PrimarySucceeded);
                payload
            }
            StageOutput::Failure { error, .. } => {
                lifecycle.advance(DocumentState::Failed(StageKind::Primary));
                warn!("{} failed in primary stage: {}", document_id, error);
                return DocumentResult::Failed {
                    document_id,
                    content_hash,
                    stage: StageKind::Primary,
                    error,
                    attempts,
                };
            }
        };

        lifecycle.advance(DocumentState::PostRunning);
        let post = self
            .post_processing
            .run(StageInput::post_processing(document, primary_payload))
            .await;
        attempts.post_processing = post.attempts();

        match post {
            StageOutput::Success { payload, .. } => {
                lifecycle.advance(DocumentState::Completed);
                DocumentResult::Completed {
                    document_id,
                    content_hash,
                    payload,
                    attempts,
                }
            }
            StageOutput::Failure { error, .. } => {
                lifecycle.advance(DocumentState::Failed(StageKind::PostProcessing));
                warn!("{} failed in post-processing stage: {}", document_id, error);
                DocumentResult::Failed {
                    document_id,
                    content_hash,
                    stage: StageKind::PostProcessing,
                    error,
                    attempts,
                }
            }
        }
    }

    /// Processes `documents` into `sink` and reports totals for the run.
    ///
    /// A sink failure aborts the run; document failures never do.
    pub async fn run<S, K>(
        &self,
        documents: S,
        sink: &mut K,
        progress: Option<&ProgressTracker>,
    ) -> Result<PipelineStats>
    where
        S: Stream<Item = Document>,
        K: ResultSink + ?Sized,
    {
        let started = Instant::now();
        let mut stats = PipelineStats::new();

        let results = self.process(documents);
        futures::pin_mut!(results);

        while let Some(result) = results.next().await {
            stats.record(&result);
            if let Some(progress) = progress {
                progress.record(&result);
            }
            sink.accept(&result)?;
        }

        stats.peak_in_flight = self.counters.peak_in_flight();
        stats.duration_ms = started.elapsed().as_millis() as u64;
        sink.finish(&stats)?;

        info!(
            "Run finished: {} completed, {} failed",
            stats.documents_completed, stats.documents_failed
        );
        Ok(stats)
    }
}
