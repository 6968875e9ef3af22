// file: src/stage/executor.rs
// description: runs one model-inference stage with validation, timeout and retries
// reference: converts runtime failures into classified stage outputs

use crate::config::PipelineConfig;
use crate::error::StageError;
use crate::models::{Payload, StageInput, StageKind, StageOutput};
use crate::runtime::ModelHandle;
use crate::stage::retry::{RetryPolicy, retry_with_policy};
use std::time::Duration;
use tracing::{debug, warn};

/// Executes one stage against its model. Never panics on model failure and
/// never touches state shared between documents.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    stage: StageKind,
    model: ModelHandle,
    timeout: Duration,
    retry: RetryPolicy,
}

impl StageExecutor {
    pub fn new(stage: StageKind, model: ModelHandle, config: &PipelineConfig) -> Self {
        Self {
            stage,
            model,
            timeout: config.stage_timeout(),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub async fn run(&self, input: StageInput) -> StageOutput {
        let document_id = input.document.id().to_string();

        if let Err(error) = input.validate(self.stage) {
            warn!("{} rejected input for {}: {}", self.stage, document_id, error);
            return StageOutput::Failure { error, attempts: 0 };
        }

        let payload = input.to_payload(self.stage);
        let label = format!("{} stage for {}", self.stage, document_id);

        let outcome = retry_with_policy(&self.retry, &label, |attempt| {
            let payload = payload.clone();
            async move { self.invoke(payload, attempt).await }
        })
        .await;

        match outcome.result {
            Ok(payload) => StageOutput::Success {
                payload,
                attempts: outcome.attempts,
            },
            Err(error) => StageOutput::Failure {
                error,
                attempts: outcome.attempts,
            },
        }
    }

    async fn invoke(&self, payload: Payload, attempt: u32) -> Result<Payload, StageError> {
        debug!("{} model call, attempt {}", self.stage, attempt);

        self.model
            .infer(payload, self.timeout)
            .await
            .map_err(|e| StageError::new(e.classify(), format!("{} stage: {}", self.stage, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffConfig, BackoffStrategy, ConcurrencyPolicy};
    use crate::error::ErrorKind;
    use crate::models::Document;
    use crate::runtime::{MockRuntime, MockStep, RuntimeError};
    use serde_json::json;
    use std::sync::Arc;

    fn config(retry_count: u32, timeout_ms: u64) -> PipelineConfig {
        PipelineConfig {
            max_concurrent_documents: 1,
            stage_timeout_ms: timeout_ms,
            retry_count,
            retry_backoff: BackoffConfig {
                strategy: BackoffStrategy::Fixed,
                initial_delay_ms: 1,
                max_delay_ms: 1,
                multiplier: 1.0,
            },
        }
    }

    fn executor(mock: Arc<MockRuntime>, stage: StageKind, config: &PipelineConfig) -> StageExecutor {
        StageExecutor::new(
            stage,
            ModelHandle::new(mock, ConcurrencyPolicy::Concurrent),
            config,
        )
    }

    fn document(id: &str) -> Arc<Document> {
        Arc::new(Document::new(id, b"page text".to_vec(), "text/plain"))
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let mock = Arc::new(MockRuntime::echo("primary"));
        let exec = executor(mock.clone(), StageKind::Primary, &config(3, 1_000));

        let empty = Arc::new(Document::new("empty", Vec::new(), "text/plain"));
        let output = exec.run(StageInput::primary(empty)).await;

        match output {
            StageOutput::Failure { error, attempts } => {
                assert_eq!(error.kind, ErrorKind::InvalidInput);
                assert_eq!(attempts, 0);
            }
            other => panic!("unexpected output: {:?}", other),
        }
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_retry_count_transient_failures_then_success() {
        let retry_count = 2;
        let steps = (0..retry_count)
            .map(|_| MockStep::Fail(RuntimeError::ResourceExhausted("gpu memory".into())))
            .collect();
        let mock = Arc::new(MockRuntime::echo("primary").with_script("a", steps));
        let exec = executor(mock.clone(), StageKind::Primary, &config(retry_count, 1_000));

        let output = exec.run(StageInput::primary(document("a"))).await;

        assert!(output.is_success());
        assert_eq!(output.attempts(), retry_count + 1);
        assert_eq!(mock.calls_for("a"), retry_count + 1);
    }

    #[tokio::test]
    async fn test_too_many_transient_failures() {
        let retry_count = 2;
        let steps = (0..=retry_count)
            .map(|_| MockStep::Fail(RuntimeError::Unavailable("worker busy".into())))
            .collect();
        let mock = Arc::new(MockRuntime::echo("primary").with_script("a", steps));
        let exec = executor(mock.clone(), StageKind::Primary, &config(retry_count, 1_000));

        match exec.run(StageInput::primary(document("a"))).await {
            StageOutput::Failure { error, attempts } => {
                assert_eq!(error.kind, ErrorKind::Transient);
                assert_eq!(attempts, retry_count + 1);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let mock = Arc::new(MockRuntime::echo("primary").with_script(
            "a",
            vec![MockStep::Fail(RuntimeError::Rejected("not a document".into()))],
        ));
        let exec = executor(mock.clone(), StageKind::Primary, &config(3, 1_000));

        let output = exec.run(StageInput::primary(document("a"))).await;

        assert!(!output.is_success());
        assert_eq!(output.attempts(), 1);
        assert_eq!(mock.calls_for("a"), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let mock = Arc::new(MockRuntime::echo("post_processing").with_script(
            "a",
            vec![MockStep::Stall(std::time::Duration::from_millis(300))],
        ));
        let exec = executor(mock.clone(), StageKind::PostProcessing, &config(1, 50));

        let input = StageInput::post_processing(document("a"), json!({"regions": [1, 2]}));
        let output = exec.run(input).await;

        assert!(output.is_success());
        assert_eq!(output.attempts(), 2);
    }

    #[tokio::test]
    async fn test_timeout_exhausted_reports_timeout() {
        let mock = Arc::new(MockRuntime::echo("primary").with_latency(
            std::time::Duration::from_millis(200),
        ));
        let exec = executor(mock, StageKind::Primary, &config(0, 20));

        match exec.run(StageInput::primary(document("a"))).await {
            StageOutput::Failure { error, attempts } => {
                assert_eq!(error.kind, ErrorKind::Timeout);
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }
}
