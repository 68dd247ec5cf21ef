//! Strata - cookie sessions over a cache and a durable store
//!
//! Main entry point for the Strata CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

mod commands;
mod logging;

use commands::{inspect, prune, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Strata - cookie sessions over a cache and a durable store
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file (overrides default discovery)
    #[arg(long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite session database (overrides config)
    #[arg(long, global = true, env = "STRATA_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the demo HTTP server
    Serve(serve::ServeArgs),

    /// Print a stored session
    Inspect(inspect::InspectArgs),

    /// Delete sessions not written for a number of days
    Prune(prune::PruneArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match cli.config {
        Some(ref path) => strata_config::LoadedConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => strata_config::load_config(None)?,
    };

    let logging = loaded.config.logging();
    let _guard = logging::init(&logging, cli.verbose)?;

    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    for path in loaded.loaded_from() {
        tracing::debug!(path = %path.display(), "Loaded config");
    }

    let ctx = commands::Context {
        db_path: cli.db.unwrap_or_else(|| loaded.config.store_path()),
        config: loaded.config,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Inspect(args) => inspect::run(args, &ctx),
        Commands::Prune(args) => prune::run(args, &ctx),
    }
}
