//! CLI command handlers.

pub mod inspect;
pub mod prune;
pub mod serve;

use std::path::PathBuf;

use strata_config::StrataConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: StrataConfig,
    /// Session database, after `--db` and `[store].path` resolution.
    pub db_path: PathBuf,
}
