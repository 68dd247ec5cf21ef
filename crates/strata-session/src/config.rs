//! Session and cache-tier configuration.

use std::time::Duration;

use chrono::TimeDelta;

/// Default cookie name carrying the session identifier.
pub const DEFAULT_COOKIE_NAME: &str = "sid";

/// Default cookie path.
pub const DEFAULT_COOKIE_PATH: &str = "/";

/// Default session lifetime when `start` is given no explicit expiration.
pub const DEFAULT_LIFETIME: TimeDelta = TimeDelta::days(7);

/// Default maximum number of entries held by the in-process cache tier.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default idle TTL for the in-process cache tier (none: LRU only).
pub const DEFAULT_TTL: Option<Duration> = None;

/// Session identity and cookie settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name of the cookie carrying the identifier.
    pub cookie_name: String,

    /// `Path` attribute of the emitted cookie.
    pub cookie_path: String,

    /// Lifetime applied by `start` when no expiration is given.
    pub lifetime: TimeDelta,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
            lifetime: DEFAULT_LIFETIME,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn with_lifetime(mut self, lifetime: TimeDelta) -> Self {
        self.lifetime = lifetime;
        self
    }
}

/// Configuration for the in-process LRU cache tier.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction.
    pub max_entries: usize,

    /// Optional idle time after which entries are dropped.
    pub ttl: Option<Duration>,

    /// Interval for the periodic expired-entry sweep (when TTL is set).
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Drop entries idle for longer than `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable idle expiry.
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
