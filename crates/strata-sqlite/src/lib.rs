//! SQLite-backed durable tier for strata sessions.
//!
//! [`SqliteStore`] implements [`strata_session::DurableStore`] over a single
//! `sessions` table keyed by session identifier. Busy/locked databases are
//! reported as transient failures and read-only databases as disabled, so
//! the two-tier store can degrade to cache-only persistence.

mod error;
mod store;

pub use error::{Result, SqliteStoreError};
pub use store::SqliteStore;
