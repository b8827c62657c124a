//! Short-lived per-key markers used to throttle achievement checks
//!
//! The orchestrator receives a [`TtlCache`] instead of owning global state.
//! Losing a marker only causes redundant evaluation, never a duplicate unlock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Key-value marker store with expiry
pub trait TtlCache: Send + Sync {
    /// Whether a live marker exists for `key`
    fn contains(&self, key: &str) -> bool;

    /// Set (or refresh) a marker for `key` that expires after `ttl`
    fn put(&self, key: &str, ttl: Duration);

    fn remove(&self, key: &str);
}

/// Process-local [`TtlCache`]. Expired markers are dropped on access and
/// on every insert, so the map stays bounded by the live keys.
#[derive(Default)]
pub struct InMemoryTtlCache {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryTtlCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TtlCache for InMemoryTtlCache {
    fn contains(&self, key: &str) -> bool {
        // A poisoned cache behaves as empty
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        match entries.get(key) {
            Some(expires) if *expires > Instant::now() => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    fn put(&self, key: &str, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            entries.retain(|_, expires| *expires > now);
            entries.insert(key.to_string(), now + ttl);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// Cache that never holds anything (throttling disabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTtlCache;

impl TtlCache for NoopTtlCache {
    fn contains(&self, _key: &str) -> bool {
        false
    }

    fn put(&self, _key: &str, _ttl: Duration) {}

    fn remove(&self, _key: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_expires() {
        let cache = InMemoryTtlCache::new();
        cache.put("achievements:u1", Duration::from_millis(20));
        assert!(cache.contains("achievements:u1"));
        assert!(!cache.contains("achievements:u2"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains("achievements:u1"));
        assert!(cache.entries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_put_drops_expired_markers() {
        let cache = InMemoryTtlCache::new();
        for user in 0..50 {
            cache.put(&format!("achievements:u{user}"), Duration::from_millis(10));
        }
        assert_eq!(cache.entries.lock().unwrap().len(), 50);

        std::thread::sleep(Duration::from_millis(30));
        cache.put("achievements:fresh", Duration::from_secs(60));

        let entries = cache.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("achievements:fresh"));
    }

    #[test]
    fn test_remove_and_noop() {
        let cache = InMemoryTtlCache::new();
        cache.put("k", Duration::from_secs(60));
        cache.remove("k");
        assert!(!cache.contains("k"));

        let noop = NoopTtlCache;
        noop.put("k", Duration::from_secs(60));
        assert!(!noop.contains("k"));
    }
}
