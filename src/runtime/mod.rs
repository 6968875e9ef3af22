// file: src/runtime/mod.rs
// description: model runtime contract and shared, policy-aware model handles
// reference: pipeline orchestration

pub mod command;
pub mod mock;

pub use command::CommandRuntime;
pub use mock::{MockRuntime, MockStep};

use crate::config::{ConcurrencyPolicy, ModelsConfig};
use crate::error::{ErrorKind, Result};
use crate::models::{Payload, StageKind};
use crate::utils::HealthCheck;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Extra lifetime granted to a runtime call past the stage timeout before the
/// runtime itself gives up on it.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("document rejected: {0}")]
    Rejected(String),

    #[error("deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("internal runtime error: {0}")]
    Internal(String),
}

impl RuntimeError {
    pub fn classify(&self) -> ErrorKind {
        match self {
            RuntimeError::ResourceExhausted(_) | RuntimeError::Unavailable(_) => {
                ErrorKind::Transient
            }
            RuntimeError::DeadlineExceeded(_) => ErrorKind::Timeout,
            RuntimeError::MalformedInput(_)
            | RuntimeError::Rejected(_)
            | RuntimeError::Internal(_) => ErrorKind::Permanent,
        }
    }
}

/// A loaded model exposing a blocking inference call.
///
/// Implementations are loaded once per process and shared by every concurrent
/// stage invocation through a [`ModelHandle`].
pub trait ModelRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn infer(&self, payload: &Payload) -> std::result::Result<Payload, RuntimeError>;

    /// Stable identifier of the loaded weights, if the runtime has one.
    fn fingerprint(&self) -> Option<&str> {
        None
    }
}

/// Shared, read-mostly handle to a loaded model.
///
/// With [`ConcurrencyPolicy::Serialized`] calls are funneled through a gate that
/// stays held until the blocking call returns, even when the caller stopped
/// waiting on it.
#[derive(Clone)]
pub struct ModelHandle {
    runtime: Arc<dyn ModelRuntime>,
    policy: ConcurrencyPolicy,
    gate: Arc<Mutex<()>>,
}

impl ModelHandle {
    pub fn new(runtime: Arc<dyn ModelRuntime>, policy: ConcurrencyPolicy) -> Self {
        Self {
            runtime,
            policy,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn name(&self) -> &str {
        self.runtime.name()
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.runtime.fingerprint()
    }

    /// Runs one inference call off the async executor, bounded by `timeout`.
    ///
    /// Waiting for the serialization gate does not count against `timeout`.
    pub async fn infer(
        &self,
        payload: Payload,
        timeout: Duration,
    ) -> std::result::Result<Payload, RuntimeError> {
        let guard = match self.policy {
            ConcurrencyPolicy::Serialized => Some(self.gate.clone().lock_owned().await),
            ConcurrencyPolicy::Concurrent => None,
        };

        let runtime = self.runtime.clone();
        let task = tokio::task::spawn_blocking(move || {
            let output = runtime.infer(&payload);
            drop(guard);
            output
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(output)) => output,
            Ok(Err(join_error)) => Err(RuntimeError::Internal(format!(
                "inference task failed: {}",
                join_error
            ))),
            Err(_) => {
                debug!("{} inference exceeded {:?}", self.name(), timeout);
                Err(RuntimeError::DeadlineExceeded(timeout))
            }
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name())
            .field("policy", &self.policy)
            .finish()
    }
}

/// The two models backing a run, owned for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ModelPair {
    pub primary: ModelHandle,
    pub post_processing: ModelHandle,
}

impl ModelPair {
    pub fn new(primary: ModelHandle, post_processing: ModelHandle) -> Self {
        Self {
            primary,
            post_processing,
        }
    }

    /// Loads both command-backed models. Any failure is fatal for the run.
    pub fn load(models: &ModelsConfig, stage_timeout: Duration) -> Result<Self> {
        let kill_after = stage_timeout + KILL_GRACE;

        let primary = CommandRuntime::load("primary", &models.primary, kill_after)?;
        info!(
            "Loaded primary model {} ({})",
            models.primary.weights_path.display(),
            primary.short_fingerprint()
        );

        let post_processing =
            CommandRuntime::load("post_processing", &models.post_processing, kill_after)?;
        info!(
            "Loaded post-processing model {} ({})",
            models.post_processing.weights_path.display(),
            post_processing.short_fingerprint()
        );

        Ok(Self::new(
            ModelHandle::new(Arc::new(primary), models.primary.concurrency),
            ModelHandle::new(Arc::new(post_processing), models.post_processing.concurrency),
        ))
    }

    /// Echo models that answer every call; used for dry runs.
    pub fn echo() -> Self {
        Self::new(
            ModelHandle::new(
                Arc::new(MockRuntime::echo("primary")),
                ConcurrencyPolicy::Concurrent,
            ),
            ModelHandle::new(
                Arc::new(MockRuntime::echo("post_processing")),
                ConcurrencyPolicy::Concurrent,
            ),
        )
    }

    pub fn handle(&self, stage: StageKind) -> &ModelHandle {
        match stage {
            StageKind::Primary => &self.primary,
            StageKind::PostProcessing => &self.post_processing,
        }
    }
}

/// Loads each configured model on its own and reports whether it came up.
pub fn check_models(models: &ModelsConfig, stage_timeout: Duration) -> Vec<HealthCheck> {
    let kill_after = stage_timeout + KILL_GRACE;

    [
        (StageKind::Primary, &models.primary),
        (StageKind::PostProcessing, &models.post_processing),
    ]
    .into_iter()
    .map(|(stage, config)| {
        let started = Instant::now();
        match CommandRuntime::load(stage.as_str(), config, kill_after) {
            Ok(runtime) => HealthCheck::healthy(
                stage.as_str(),
                Some(format!(
                    "{} (sha256 {})",
                    runtime.weights_path().display(),
                    runtime.short_fingerprint()
                )),
                started.elapsed(),
            ),
            Err(e) => HealthCheck::unhealthy(stage.as_str(), e.to_string(), started.elapsed()),
        }
    })
    .collect()
}
