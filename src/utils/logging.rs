// file: src/utils/logging.rs
// description: Tracing subscriber initialization and colored console summaries

use crate::pipeline::PipelineStats;
use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber. `RUST_LOG`, when set, wins over `verbose`.
pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(true)
        .with_line_number(true)
        .compact()
        .with_ansi(colored_output);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

/// End-of-run summary lines for the console.
pub fn format_run_summary(stats: &PipelineStats) -> Vec<String> {
    let mut lines = vec![format_info(&format!(
        "{} documents in {:.2}s ({:.2} docs/sec, peak {} in flight)",
        stats.total_documents(),
        stats.duration_ms as f64 / 1000.0,
        stats.documents_per_second(),
        stats.peak_in_flight
    ))];

    lines.push(format_success(&format!(
        "Completed: {} ({:.1}%)",
        stats.documents_completed,
        stats.success_rate()
    )));

    if stats.documents_failed > 0 {
        lines.push(format_error(&format!(
            "Failed: {} (primary {}, post-processing {})",
            stats.documents_failed, stats.failed_primary, stats.failed_post_processing
        )));
    }

    lines
}
