// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use doc_ingest::runtime::check_models;
use doc_ingest::source::skip_completed;
use doc_ingest::utils::logging::{format_info, format_run_summary, format_warning};
use doc_ingest::{
    Config, DirectorySource, HealthReport, JsonlSink, ModelFingerprint, ModelPair,
    OperationTimer, PipelineCoordinator, ProgressTracker, StageKind,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "doc_ingest")]
#[command(author = "cipher")]
#[command(version = "0.1.0")]
#[command(about = "Two-stage model inference pipeline for document ingestion", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every document in the input directory through both models
    Ingest {
        /// Use echo models instead of loading weights
        #[arg(long)]
        dry_run: bool,

        /// Keep existing results and skip documents already completed
        #[arg(long)]
        resume: bool,

        #[arg(long, value_name = "NUM")]
        limit: Option<usize>,
    },

    /// Load both models and report their health
    Verify,

    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.color {
        colored::control::set_override(false);
    }
    doc_ingest::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Document ingestion pipeline");
    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    match cli.command {
        Commands::Ingest {
            dry_run,
            resume,
            limit,
        } => {
            cmd_ingest(&config, dry_run, resume, limit, cli.color).await?;
        }
        Commands::Verify => {
            cmd_verify(&config)?;
        }
        Commands::ShowConfig => {
            cmd_show_config(&config)?;
        }
    }

    Ok(())
}

async fn cmd_ingest(
    config: &Config,
    dry_run: bool,
    resume: bool,
    limit: Option<usize>,
    color: bool,
) -> Result<()> {
    let timer = OperationTimer::new("ingest");

    let mut output = config.output.clone();
    output.resume |= resume;

    let models = if dry_run {
        warn!("Dry run: using echo models, no weights are loaded");
        ModelPair::echo()
    } else {
        ModelPair::load(&config.models, config.pipeline.stage_timeout())
            .context("Failed to load models")?
    };
    timer.checkpoint("models ready");

    let source = DirectorySource::new(config.source.clone());
    let mut files = source.scan().context("Failed to scan input directory")?;
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    info!("Found {} documents to process", files.len());

    let run_id = Uuid::new_v4();
    let mut sink = JsonlSink::open(&output, run_id)
        .context("Failed to open result file")?
        .with_models(fingerprints(&models));
    info!("Run {} writing to {}", run_id, sink.results_path().display());

    let progress = ProgressTracker::with_color(files.len(), color);
    let documents = skip_completed(
        DirectorySource::documents(files),
        sink.completed().clone(),
        |_| progress.record_skipped(),
    );

    let coordinator = PipelineCoordinator::new(&models, &config.pipeline);
    let stop = coordinator.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing documents already in flight");
            stop.cancel();
        }
    });

    let stats = coordinator
        .run(documents, &mut sink, Some(&progress))
        .await
        .context("Ingestion run failed")?;
    progress.finish();

    for line in format_run_summary(&stats) {
        println!("{}", line);
    }
    if coordinator.is_stopped() {
        println!(
            "{}",
            format_warning("Run was interrupted; rerun with --resume to continue")
        );
    }
    println!(
        "{}",
        format_info(&format!("Results: {}", sink.results_path().display()))
    );

    timer.finish();
    Ok(())
}

fn fingerprints(models: &ModelPair) -> Vec<ModelFingerprint> {
    [StageKind::Primary, StageKind::PostProcessing]
        .into_iter()
        .map(|stage| {
            let handle = models.handle(stage);
            ModelFingerprint {
                stage: stage.as_str().to_string(),
                name: handle.name().to_string(),
                fingerprint: handle.fingerprint().map(String::from),
            }
        })
        .collect()
}

fn cmd_verify(config: &Config) -> Result<()> {
    info!("Verifying model weights");

    let checks = check_models(&config.models, config.pipeline.stage_timeout());
    let report = HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string());

    println!("{}", report.format());

    if !report.is_healthy() {
        error!("One or more models failed to load");
        return Err(anyhow::anyhow!("Model verification failed"));
    }

    info!("Both models loaded successfully");
    Ok(())
}

fn cmd_show_config(config: &Config) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{}", json);
    Ok(())
}
