// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub models: ModelsConfig,
    pub source: SourceConfig,
    pub output: OutputConfig,
}

/// Options consumed by the coordinator and the stage executors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub max_concurrent_documents: usize,
    pub stage_timeout_ms: u64,
    pub retry_count: u32,
    #[serde(default)]
    pub retry_backoff: BackoffConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

/// Whether a loaded model may serve several inference calls at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    Concurrent,
    #[default]
    Serialized,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    pub primary: ModelConfig,
    pub post_processing: ModelConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub weights_path: PathBuf,
    /// Inference worker program followed by its arguments.
    pub command: Vec<String>,
    #[serde(default)]
    pub concurrency: ConcurrencyPolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub input_dir: PathBuf,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub skip_patterns: Vec<String>,
    pub max_file_size_mb: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub result_dir: PathBuf,
    pub dataset_id: String,
    #[serde(default)]
    pub resume: bool,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_documents: 4,
            stage_timeout_ms: 120_000,
            retry_count: 2,
            retry_backoff: BackoffConfig::default(),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: default_multiplier(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(config::File::from(Path::new("config/default.toml")));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOC_INGEST")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            models: ModelsConfig {
                primary: ModelConfig {
                    weights_path: PathBuf::from("weights/model_weights.pth"),
                    command: vec!["ingest-infer".to_string(), "detect".to_string()],
                    concurrency: ConcurrencyPolicy::Serialized,
                },
                post_processing: ModelConfig {
                    weights_path: PathBuf::from("weights/pp_model_weights.pth"),
                    command: vec!["ingest-infer".to_string(), "postprocess".to_string()],
                    concurrency: ConcurrencyPolicy::Concurrent,
                },
            },
            source: SourceConfig {
                input_dir: PathBuf::from("./input"),
                extensions: vec!["pdf".to_string(), "txt".to_string()],
                skip_patterns: vec![".git/*".to_string(), "*.tmp".to_string()],
                max_file_size_mb: 200,
            },
            output: OutputConfig {
                result_dir: PathBuf::from("./output"),
                dataset_id: "default".to_string(),
                resume: false,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrent_documents == 0 {
            return Err(PipelineError::Config(
                "max_concurrent_documents must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.stage_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "stage_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let backoff = &self.pipeline.retry_backoff;
        if backoff.max_delay_ms < backoff.initial_delay_ms {
            return Err(PipelineError::Config(
                "retry_backoff.max_delay_ms must not be below initial_delay_ms".to_string(),
            ));
        }

        if backoff.multiplier < 1.0 {
            return Err(PipelineError::Config(
                "retry_backoff.multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.models.primary.weights_path == self.models.post_processing.weights_path {
            return Err(PipelineError::Config(
                "primary and post_processing models must use distinct weight files".to_string(),
            ));
        }

        for (name, model) in [
            ("primary", &self.models.primary),
            ("post_processing", &self.models.post_processing),
        ] {
            if model.command.is_empty() || model.command[0].trim().is_empty() {
                return Err(PipelineError::Config(format!(
                    "models.{}.command must name an inference program",
                    name
                )));
            }
        }

        if self.output.dataset_id.trim().is_empty() {
            return Err(PipelineError::Config(
                "output.dataset_id must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
