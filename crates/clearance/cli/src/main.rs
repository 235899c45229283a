//! Clearance CLI - scripted runs of the graduation clearance workflow
//!
//! The CLI provides:
//! - `run`: load a seed, apply a script of operations, print the transcript
//! - `config`: print the effective configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use clearance_engine::ClearanceService;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod script;

use config::CliConfig;
use script::{ScriptRunner, Seed, Step};

/// Clearance CLI
#[derive(Parser)]
#[command(name = "clearance")]
#[command(about = "Graduation clearance workflow", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CLEARANCE_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configured level)
    #[arg(long, env = "CLEARANCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "CLEARANCE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Apply a script of operations to a seeded in-memory workflow
    Run {
        /// JSON file with students, groups and course results
        #[arg(long)]
        seed: PathBuf,

        /// JSON file with the list of operations
        #[arg(long)]
        script: PathBuf,
    },

    /// Show configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = CliConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.json || config.logging.json,
    );

    match cli.command {
        Commands::Run { seed, script } => run(config, &seed, &script).await,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.to_string().into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(config: CliConfig, seed_path: &Path, script_path: &Path) -> anyhow::Result<()> {
    let seed: Seed = read_json(seed_path)?;
    let steps: Vec<Step> = read_json(script_path)?;

    let service = ClearanceService::in_memory(config.engine).context("building the service")?;
    let mut runner = ScriptRunner::new(&service);
    runner.apply_seed(seed).await.context("applying the seed")?;

    tracing::info!(steps = steps.len(), "Running script");
    let report = runner.run(steps).await?;
    let refused = report.steps.iter().filter(|s| !s.is_ok()).count();
    tracing::info!(
        refused,
        students = report.students.len(),
        "Script finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}
