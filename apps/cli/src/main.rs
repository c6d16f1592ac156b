//! Forge CLI - command-line interface for the forge post-training platform.
//!
//! This CLI provides a `forge` command for inspecting the cluster, datasets,
//! runs, and registered models, plus an in-process end-to-end `demo`.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use forge_core::ForgeConfig;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{cluster, datasets, demo, models, runs};

/// Forge CLI - LLM post-training orchestration
#[derive(Parser, Debug)]
#[command(
    name = "forge",
    author,
    version,
    about = "Forge - LLM post-training orchestration",
    long_about = "Forge drives fine-tuning runs from launch through metric capture, evaluation, \
                  and promotion,\nwhile arbitrating access to a shared accelerator pool."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Configuration file (defaults to ./forge.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect the accelerator pool
    #[command(subcommand)]
    Cluster(cluster::ClusterCommand),

    /// List registered datasets
    #[command(subcommand)]
    Datasets(datasets::DatasetsCommand),

    /// List training runs
    #[command(subcommand)]
    Runs(runs::RunsCommand),

    /// List registered models
    #[command(subcommand)]
    Models(models::ModelsCommand),

    /// Seed datasets, train, evaluate, and promote end to end
    ///
    /// Runs entirely in-process against the configured database.
    Demo {
        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ForgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let level = args
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "warn".to_string());
    init_tracing(&level)?;

    match args.command {
        Command::Cluster(cmd) => cluster::execute(cmd, config).await,
        Command::Datasets(cmd) => datasets::execute(cmd, config),
        Command::Runs(cmd) => runs::execute(cmd, config),
        Command::Models(cmd) => models::execute(cmd, config),
        Command::Demo { json } => demo::execute(config, json).await,
    }
}
