// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod runtime;
pub mod sink;
pub mod source;
pub mod stage;
pub mod utils;

pub use config::{
    BackoffConfig, BackoffStrategy, ConcurrencyPolicy, Config, ModelConfig, ModelsConfig,
    OutputConfig, PipelineConfig, SourceConfig,
};
pub use error::{ErrorKind, PipelineError, Result, StageError};
pub use models::{
    Document, DocumentContent, DocumentMetadata, DocumentResult, Payload, StageAttempts,
    StageInput, StageKind, StageOutput,
};
pub use pipeline::{
    DocumentLifecycle, DocumentState, PipelineCoordinator, PipelineStats, ProgressTracker,
    RunCounters,
};
pub use runtime::{
    CommandRuntime, MockRuntime, MockStep, ModelHandle, ModelPair, ModelRuntime, RuntimeError,
};
pub use sink::{CollectingSink, JsonlSink, ModelFingerprint, ResultSink, RunManifest};
pub use source::{DirectorySource, ScannedFile};
pub use stage::{RetryOutcome, RetryPolicy, StageExecutor, retry_with_policy};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        let models = ModelPair::echo();
        let coordinator = PipelineCoordinator::new(&models, &config.pipeline);
        assert_eq!(coordinator.max_concurrent(), 4);
    }
}
