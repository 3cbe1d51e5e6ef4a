//! Vybe Visual CLI - Main Entry Point
//!
//! Compares the static reference build against the live candidate app and
//! exits non-zero when any page goes over its difference budget.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{compare, config, diff, selectors};

/// Reference-vs-candidate visual regression audits
#[derive(Parser)]
#[command(name = "vybe-visual")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Audit configuration file
    #[arg(long, env = "VYBE_VISUAL_CONFIG", default_value = "vybe-visual.toml", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture, diff and report every configured page
    Compare(compare::CompareArgs),

    /// Pixel-diff two existing screenshots
    Diff(diff::DiffArgs),

    /// Show the tracked selector set
    Selectors,

    /// Manage the configuration file
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let passed = match cli.command {
        Commands::Compare(args) => compare::execute(args, &cli.config, cli.format).await?,
        Commands::Diff(args) => diff::execute(args, &cli.config, cli.format).await?,
        Commands::Selectors => {
            selectors::execute(&cli.config, cli.format)?;
            true
        }
        Commands::Config(cmd) => {
            config::execute(cmd, &cli.config, cli.format)?;
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }

    Ok(())
}
