//! Serve command - runs the demo HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use strata_server::{AppState, Server, record_registry};
use strata_session::{MemoryCache, PayloadCodec, SessionManager, TwoTierStore};
use strata_sqlite::SqliteStore;
use tracing::info;

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let bind = args.bind.unwrap_or_else(|| ctx.config.bind());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", bind))?;

    let session_config = ctx.config.session_config()?;
    let cache = Arc::new(MemoryCache::new(ctx.config.cache_config()?));
    let durable = SqliteStore::open(&ctx.db_path)
        .with_context(|| format!("opening {}", ctx.db_path.display()))?;
    info!(
        db = %ctx.db_path.display(),
        sessions = durable.count()?,
        cache_capacity = cache.config().max_entries,
        "Session store ready"
    );

    let store = TwoTierStore::new(cache.clone(), durable, PayloadCodec::new(record_registry()));
    let state = AppState::new(SessionManager::new(store, session_config)).with_cache(cache);

    Server::new(state).run_until(addr, shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
