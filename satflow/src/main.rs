//! Satflow CLI.
//!
//! `satflow run <stage>` reads a pipeline event (a file, `-` for stdin, or
//! nothing for `{}`), runs the stage and prints the resulting event on
//! stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use satflow::config::PipelineConfig;
use satflow::observability::{init_logging, LogFormat};
use satflow::runner::StageRunner;
use satflow::stages::StageKind;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "satflow", version, about = "Retry-safe satellite data ingestion stages")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "SATFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    /// Filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one stage invocation.
    Run {
        /// Stage name: poll, latest, available, extract, process, archive or collect.
        stage: StageKind,
        /// Input event file, or `-` for stdin.
        #[arg(long)]
        event: Option<String>,
        /// Pretty-print the output event.
        #[arg(long)]
        pretty: bool,
    },
    /// Create the marker parameters if they do not exist.
    Bootstrap,
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate the configuration, and optionally what stages need.
    Check {
        /// Stages to check; all of them when `--all` is given.
        #[arg(long = "stage")]
        stages: Vec<StageKind>,
        /// Check every stage.
        #[arg(long, conflicts_with = "stages")]
        all: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path),
        None => PipelineConfig::from_env(),
    };
    config.context("invalid configuration")
}

fn read_event(source: Option<&str>) -> Result<serde_json::Value> {
    let raw = match source {
        None => return Ok(serde_json::json!({})),
        Some("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading event from stdin")?;
            buf
        }
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("reading event file {path}"))?
        }
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into(), &cli.log_level);

    let config = load_config(cli.config.as_ref())?;
    let runner = StageRunner::from_config(config).context("wiring collaborators")?;

    match cli.command {
        Commands::Run {
            stage,
            event,
            pretty,
        } => {
            runner
                .validate_for(stage)
                .with_context(|| format!("stage '{stage}' is not runnable"))?;
            let input = read_event(event.as_deref())?;
            let output = runner.run(stage, input).await;
            let rendered = if pretty {
                serde_json::to_string_pretty(&output)?
            } else {
                serde_json::to_string(&output)?
            };
            println!("{rendered}");
        }
        Commands::Bootstrap => {
            let report = runner.bootstrap().await.context("bootstrapping markers")?;
            info!(
                high_water_mark_created = report.high_water_mark_created,
                latest_available_created = report.latest_available_created,
                "Bootstrap finished"
            );
            println!("{}", serde_json::to_string(&report)?);
        }
        Commands::Config {
            command: ConfigCommands::Check { stages, all },
        } => {
            let stages = if all { StageKind::ALL.to_vec() } else { stages };
            for stage in &stages {
                runner
                    .validate_for(*stage)
                    .with_context(|| format!("stage '{stage}' is not runnable"))?;
            }
            info!(stages = stages.len(), "Configuration is valid");
            println!("ok");
        }
    }
    Ok(())
}
