//! Fault-injecting storage doubles.
//!
//! Available to this crate's tests and, through the `testing` feature, to
//! downstream test code that needs to drive the two-tier store through
//! partial failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::store::{Cache, DurableStore};

/// In-memory [`Cache`] whose writes can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    failing_sets: AtomicUsize,
    set_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FlakyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes return `false` without storing anything.
    pub fn fail_next_sets(&self, n: usize) {
        self.failing_sets.store(n, Ordering::SeqCst);
    }

    /// Drop an entry as if the cache had evicted it.
    pub fn evict(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

impl Cache for FlakyCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> bool {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_sets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return false;
        }
        self.entries.lock().insert(key.to_string(), value.to_vec());
        true
    }

    fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// In-memory [`DurableStore`] with switchable failures.
#[derive(Debug, Default)]
pub struct FlakyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    put_error: Mutex<Option<StoreError>>,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
    get_calls: AtomicUsize,
    put_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `error` (`None` restores writes).
    pub fn fail_puts_with(&self, error: Option<StoreError>) {
        *self.put_error.lock() = error;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }
}

impl DurableStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::TransientFailure("injected read failure".into()));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.put_error.lock().clone() {
            return Err(err);
        }
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::TransientFailure("injected delete failure".into()));
        }
        self.entries.lock().remove(key);
        Ok(())
    }
}
