//! Idle-time tracking for the in-process cache tier.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks when each cache key was last written or read.
#[derive(Debug)]
pub(crate) struct TtlTracker {
    touched: HashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl TtlTracker {
    /// Create a tracker. `None` disables expiry.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            touched: HashMap::new(),
            ttl,
        }
    }

    /// Record an access for `key` now.
    pub fn touch(&mut self, key: &str) {
        self.touch_at(key, Instant::now());
    }

    fn touch_at(&mut self, key: &str, at: Instant) {
        self.touched.insert(key.to_string(), at);
    }

    /// Whether `key` has been idle longer than the TTL.
    ///
    /// Untracked keys count as expired when a TTL is set.
    pub fn is_expired(&self, key: &str) -> bool {
        self.is_expired_at(key, Instant::now())
    }

    fn is_expired_at(&self, key: &str, now: Instant) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match self.touched.get(key) {
            Some(at) => now.saturating_duration_since(*at) > ttl,
            None => true,
        }
    }

    /// Stop tracking `key`.
    pub fn remove(&mut self, key: &str) {
        self.touched.remove(key);
    }

    /// Remove and return every expired key.
    pub fn drain_expired(&mut self) -> Vec<String> {
        self.drain_expired_at(Instant::now())
    }

    fn drain_expired_at(&mut self, now: Instant) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let expired: Vec<String> = self
            .touched
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.touched.remove(key);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.touched.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ttl_never_expires() {
        let mut tracker = TtlTracker::new(None);
        let start = Instant::now();
        tracker.touch_at("k", start);

        assert!(!tracker.is_expired_at("k", start + Duration::from_secs(86_400)));
        assert!(!tracker.is_expired("never-touched"));
        assert!(tracker.drain_expired().is_empty());
    }

    #[test]
    fn test_idle_key_expires() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(10)));
        let start = Instant::now();
        tracker.touch_at("k", start);

        assert!(!tracker.is_expired_at("k", start + Duration::from_secs(10)));
        assert!(tracker.is_expired_at("k", start + Duration::from_secs(11)));
    }

    #[test]
    fn test_touch_resets_idle_time() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(10)));
        let start = Instant::now();
        tracker.touch_at("k", start);
        tracker.touch_at("k", start + Duration::from_secs(8));

        assert!(!tracker.is_expired_at("k", start + Duration::from_secs(15)));
    }

    #[test]
    fn test_drain_only_removes_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(10)));
        let start = Instant::now();
        tracker.touch_at("old", start);
        tracker.touch_at("fresh", start + Duration::from_secs(9));

        let drained = tracker.drain_expired_at(start + Duration::from_secs(12));
        assert_eq!(drained, vec!["old".to_string()]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_untracked_key_counts_as_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_secs(60)));
        tracker.touch("a");
        tracker.remove("a");

        assert_eq!(tracker.len(), 0);
        assert!(tracker.is_expired("a"));
    }
}
