//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use strata_session::{MemoryCache, SessionManager};
use tokio::task::JoinHandle;
use tracing::debug;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle hook for the session store.
    pub sessions: SessionManager,

    /// In-process cache tier, when the caller wants periodic TTL sweeps.
    pub cache: Option<Arc<MemoryCache>>,
}

impl AppState {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            cache: None,
        }
    }

    /// Attach the in-process cache so [`AppState::spawn_cache_cleanup`] can
    /// sweep it.
    pub fn with_cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Spawn the background sweep of expired cache entries.
    ///
    /// Returns `None` when no cache is attached or the cache has no TTL.
    pub fn spawn_cache_cleanup(&self) -> Option<JoinHandle<()>> {
        let cache = self.cache.clone()?;
        cache.config().ttl?;
        let interval = cache.config().cleanup_interval;
        Some(spawn_cleanup_task(cache, interval))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions)
            .field("cache", &self.cache.as_ref().map(|c| c.stats()))
            .finish()
    }
}

fn spawn_cleanup_task(cache: Arc<MemoryCache>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup_expired();
            if removed > 0 {
                debug!(removed, remaining = cache.len(), "Swept expired sessions from cache");
            }
        }
    })
}
