//! Prune command - deletes sessions not written for a number of days.

use anyhow::{Context as _, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::Args;
use strata_sqlite::SqliteStore;

use super::Context;

/// Arguments for the prune command.
#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Delete sessions last written more than this many days ago
    #[arg(long)]
    pub older_than_days: u32,
}

/// Run the prune command.
pub fn run(args: PruneArgs, ctx: &Context) -> Result<()> {
    let store = SqliteStore::open(&ctx.db_path)
        .with_context(|| format!("opening {}", ctx.db_path.display()))?;
    let cutoff = cutoff(Utc::now(), args.older_than_days);

    let removed = store.prune_older_than(cutoff)?;
    println!(
        "Removed {} session(s) last written before {}",
        removed,
        cutoff.to_rfc3339()
    );
    Ok(())
}

fn cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now - TimeDelta::days(i64::from(days))
}
