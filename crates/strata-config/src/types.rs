//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [session]    # cookie name, path and default lifetime
//! [cache]      # in-process cache tier
//! [store]      # durable SQLite store
//! [server]     # HTTP bind address
//! [logging]    # log filter and JSON log directory
//! ```

use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use strata_session::{CacheConfig, SessionConfig};

use crate::error::{ConfigError, Result};

/// Default bind address for `strata serve`.
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default database filename inside the data directory.
const DEFAULT_DB_FILE: &str = "sessions.db";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub session: Option<SessionSection>,
    pub cache: Option<CacheSection>,
    pub store: Option<StoreSection>,
    pub server: Option<ServerSection>,
    pub logging: Option<LoggingSection>,
}

impl StrataConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: StrataConfig) {
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.cache.is_some() {
            self.cache = other.cache;
        }
        if other.store.is_some() {
            self.store = other.store;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Resolve the `[session]` section into runtime settings.
    pub fn session_config(&self) -> Result<SessionConfig> {
        self.session.clone().unwrap_or_default().to_session_config()
    }

    /// Resolve the `[cache]` section into runtime settings.
    pub fn cache_config(&self) -> Result<CacheConfig> {
        self.cache.clone().unwrap_or_default().to_cache_config()
    }

    /// Path of the SQLite database, falling back to the platform data dir.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(default_store_path)
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .map(|s| s.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }

    /// Check every section for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.session_config()?;
        self.cache_config()?;
        Ok(())
    }
}

/// `~/.local/share/strata/sessions.db` on Linux, `./sessions.db` when the
/// platform has no data directory.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("strata").join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Name of the cookie carrying the session identifier.
    pub cookie_name: String,
    /// `Path` attribute of the emitted cookie.
    pub cookie_path: String,
    /// Default session lifetime in seconds.
    pub lifetime_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            cookie_name: defaults.cookie_name,
            cookie_path: defaults.cookie_path,
            lifetime_secs: defaults.lifetime.num_seconds().unsigned_abs(),
        }
    }
}

impl SessionSection {
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        if self.cookie_name.is_empty() || !self.cookie_name.chars().all(is_token_char) {
            return Err(ConfigError::invalid(
                "session.cookie_name",
                format!("'{}' is not a valid cookie name", self.cookie_name),
            ));
        }
        if !self.cookie_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "session.cookie_path",
                "must start with '/'",
            ));
        }
        let lifetime = i64::try_from(self.lifetime_secs)
            .ok()
            .filter(|secs| *secs > 0)
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| ConfigError::invalid("session.lifetime_secs", "must be positive"))?;

        Ok(SessionConfig::new()
            .with_cookie_name(self.cookie_name.clone())
            .with_cookie_path(self.cookie_path.clone())
            .with_lifetime(lifetime))
    }
}

/// RFC 6265 cookie-name characters.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// Maximum number of cached sessions before LRU eviction.
    pub max_entries: usize,
    /// Idle TTL in seconds. Absent means LRU eviction only.
    pub ttl_secs: Option<u64>,
    /// How often the server sweeps expired entries, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            max_entries: defaults.max_entries,
            ttl_secs: defaults.ttl.map(|d| d.as_secs()),
            cleanup_interval_secs: defaults.cleanup_interval.as_secs(),
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> Result<CacheConfig> {
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "must be at least 1"));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "cache.cleanup_interval_secs",
                "must be at least 1",
            ));
        }

        let config = CacheConfig::new()
            .with_max_entries(self.max_entries)
            .with_cleanup_interval(Duration::from_secs(self.cleanup_interval_secs));
        Ok(match self.ttl_secs {
            Some(0) => {
                return Err(ConfigError::invalid("cache.ttl_secs", "must be at least 1"));
            }
            Some(secs) => config.with_ttl(Duration::from_secs(secs)),
            None => config.without_ttl(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store / Server / Logging
// ─────────────────────────────────────────────────────────────────────────────

/// `[store]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite database path.
    pub path: Option<PathBuf>,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Socket address to listen on.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
    /// Directory for daily-rotated JSON logs. Absent disables file logging.
    pub json_dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json_dir: None,
        }
    }
}
