//! In-process cache tier with LRU eviction and idle TTL.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::store::Cache;
use crate::ttl::TtlTracker;

/// Inner state protected by the mutex.
struct CacheInner {
    lru: LruCache<String, Vec<u8>>,
    ttl: TtlTracker,
}

/// Bounded in-process [`Cache`] tier.
///
/// - LRU eviction once `max_entries` is reached
/// - Optional idle TTL (entries not touched within the TTL read as misses)
///
/// Evictions are silent, which is exactly the contract the two-tier store
/// expects from a cache: the durable tier backs every evicted entry.
pub struct MemoryCache {
    inner: Mutex<CacheInner>,
    config: CacheConfig,
}

impl MemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Mutex::new(CacheInner {
                lru: LruCache::new(cap),
                ttl: TtlTracker::new(config.ttl),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Whether `key` is cached and not expired, without touching LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let inner = self.inner.lock();
        inner.lru.contains(key) && !inner.ttl.is_expired(key)
    }

    /// Drop every entry idle for longer than the TTL. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired = inner.ttl.drain_expired();
        let mut count = 0;
        for key in expired {
            if inner.lru.pop(&key).is_some() {
                count += 1;
            }
        }

        if count > 0 {
            debug!(count, "Dropped expired cache entries");
        }
        count
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.lru.len(),
            capacity: self.config.max_entries,
            ttl_tracked: inner.ttl.len(),
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();

        if inner.ttl.is_expired(key) {
            if inner.lru.pop(key).is_some() {
                trace!(key = %key, "Cache entry expired");
            }
            inner.ttl.remove(key);
            return None;
        }

        let value = inner.lru.get(key).cloned();
        if value.is_some() {
            inner.ttl.touch(key);
        }
        value
    }

    fn set(&self, key: &str, value: &[u8]) -> bool {
        let mut inner = self.inner.lock();

        if let Some((evicted, _)) = inner.lru.push(key.to_string(), value.to_vec())
            && evicted != key
        {
            trace!(key = %evicted, "Evicted LRU cache entry");
            inner.ttl.remove(&evicted);
        }
        inner.ttl.touch(key);
        true
    }

    fn delete(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.lru.pop(key);
        inner.ttl.remove(key);
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached entries.
    pub size: usize,

    /// Maximum capacity.
    pub capacity: usize,

    /// Number of entries tracked for TTL.
    pub ttl_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_set_and_get() {
        let cache = MemoryCache::new(CacheConfig::new().with_max_entries(10));

        assert!(cache.set("a", b"one"));
        assert_eq!(cache.get("a"), Some(b"one".to_vec()));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = MemoryCache::new(CacheConfig::new().with_max_entries(3));

        for key in ["a", "b", "c"] {
            cache.set(key, key.as_bytes());
        }
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        cache.set("d", b"d");

        assert_eq!(cache.len(), 3);
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.stats().ttl_tracked, 3);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let cache = MemoryCache::new(CacheConfig::new().with_max_entries(2));
        cache.set("a", b"1");
        cache.set("a", b"2");

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(b"2".to_vec()));
    }

    #[test]
    fn test_delete() {
        let cache = MemoryCache::default();
        cache.set("a", b"1");
        cache.delete("a");
        cache.delete("never-set");

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_ttl_expiry_reads_as_miss() {
        let cache = MemoryCache::new(CacheConfig::new().with_ttl(Duration::from_millis(20)));
        cache.set("a", b"1");
        assert!(cache.contains("a"));

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let cache = MemoryCache::new(CacheConfig::new().with_ttl(Duration::from_millis(20)));
        cache.set("a", b"1");
        cache.set("b", b"2");

        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(
            cache.stats(),
            CacheStats {
                size: 0,
                capacity: crate::config::DEFAULT_MAX_ENTRIES,
                ttl_tracked: 0,
            }
        );
    }
}
