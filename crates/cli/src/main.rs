//! Flight delay model training CLI
//!
//! Trains delay classifiers from the historical flights dataset, exports
//! them as ONNX artifacts, and evaluates or inspects existing artifacts.

mod commands;
mod output;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{evaluate, train};
use tracing_subscriber::EnvFilter;

/// Flight delay model training CLI
#[derive(Parser)]
#[command(name = "delay-train")]
#[command(author, version, about = "Train, evaluate and inspect flight delay models", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a classifier and export it as an ONNX artifact
    Train(train::TrainArgs),

    /// Score an artifact against a labelled dataset
    Evaluate(evaluate::EvaluateArgs),

    /// Show an artifact's metadata
    Inspect(evaluate::InspectArgs),
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Train(args) => train::run(args, cli.format).await?,
        Commands::Evaluate(args) => evaluate::run_evaluate(args, cli.format).await?,
        Commands::Inspect(args) => evaluate::run_inspect(args, cli.format)?,
    }

    Ok(())
}
