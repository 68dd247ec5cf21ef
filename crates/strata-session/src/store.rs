//! Storage capabilities consumed by the two-tier store.
//!
//! These traits decouple session handling from concrete backends. A
//! [`Cache`] is a volatile, low-latency tier that may drop entries at any
//! time; a [`DurableStore`] is the authoritative tier consulted when the
//! cache misses. Both are keyed by the session identifier and hold the
//! encoded payload bytes.

use std::sync::Arc;

use crate::error::StoreError;

/// Volatile cache tier.
///
/// Implementations are best-effort: a backend fault reads as a miss and a
/// failed write returns `false`. Nothing stored here is trusted for
/// durability.
pub trait Cache: Send + Sync {
    /// Fetch the bytes stored under `key`.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`. Returns whether the write took effect.
    fn set(&self, key: &str, value: &[u8]) -> bool;

    /// Remove `key`. Absent keys are ignored.
    fn delete(&self, key: &str);
}

/// Authoritative, long-lived storage tier.
pub trait DurableStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    ///
    /// Return `Ok(None)` if the key doesn't exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace the bytes stored under `key`.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Remove `key`. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

impl<T: Cache + ?Sized> Cache for Arc<T> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> bool {
        (**self).set(key, value)
    }

    fn delete(&self, key: &str) {
        (**self).delete(key)
    }
}

impl<T: DurableStore + ?Sized> DurableStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }
}

/// A durable tier that stores nothing.
///
/// Useful for cache-only deployments; every load that misses the cache is
/// reported as lost.
#[derive(Debug, Clone, Default)]
pub struct NoDurableStore;

impl DurableStore for NoDurableStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(None)
    }

    fn put(&self, _key: &str, _value: &[u8]) -> Result<(), StoreError> {
        Err(StoreError::CapabilityDisabled(
            "no durable store configured".to_string(),
        ))
    }

    fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}
