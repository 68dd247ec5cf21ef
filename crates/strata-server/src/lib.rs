//! HTTP integration for Strata sessions.
//!
//! This crate wires the session lifecycle hook into an axum request cycle:
//!
//! - [`session_middleware`] loads the session before a handler runs and
//!   finalizes it afterwards, on success, error, or panic
//! - [`SessionHandle`] extracts the request-scoped session in handlers
//! - [`ServerError`] renders session failures as JSON error responses
//! - A small demo router (visit counter, login with identifier rotation,
//!   logout, whoami)
//!
//! # Example
//!
//! ```ignore
//! use strata_server::{AppState, Server};
//!
//! let state = AppState::new(manager);
//! Server::new(state).run("127.0.0.1:8080".parse()?).await?;
//! ```

pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod user;

pub use error::{ErrorResponse, Result, ServerError};
pub use session::{SessionHandle, session_middleware};
pub use state::AppState;
pub use user::{USER_KEY, UserRecord, record_registry};

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Strata demo HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    ///
    /// `/health` is mounted outside the session layer.
    pub fn router(&self) -> Router {
        Router::new()
            .merge(routes::demo_routes())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                session::session_middleware,
            ))
            .merge(routes::health_routes())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until the process is stopped.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves, then drain connections.
    pub async fn run_until<F>(self, addr: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let _cleanup = self.state.spawn_cache_cleanup().map(AbortOnDrop);
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        info!(
            addr = %listener.local_addr().unwrap_or(addr),
            "Starting server"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Stops the cache sweep when the server returns.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
