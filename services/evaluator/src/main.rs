//! Forecast verification evaluator.
//!
//! Runs one project declaration against one data file and writes the
//! resulting statistics to stdout as JSON. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use evaluator::{run_project, EvaluatorConfig, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "evaluator")]
#[command(about = "Forecast verification: pool assembly and statistics")]
struct Args {
    /// YAML project declaration
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// JSON data file with raw time series and unit conversions
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = EvaluatorConfig::from_env();
    if let Some(project) = args.project {
        config.project_path = Some(project);
    }
    if let Some(data) = args.data {
        config.data_path = Some(data);
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    if let Some(log_format) = args.log_format {
        config.log_format = log_format;
    }

    // Initialize tracing
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
    }

    info!(
        threshold_threads = config.executor.threshold_threads,
        metric_threads = config.executor.metric_threads,
        "Starting evaluator"
    );

    let output = run_project(&config).await.context("Evaluation failed")?;
    println!("{}", output.to_json()?);

    Ok(())
}
