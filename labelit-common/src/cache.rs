//! Time-bounded memoization for expensive read operations
//!
//! An explicit per-process cache object holding key → (value, expiry) pairs.
//! Writes that affect cached aggregates do not invalidate entries; a cached
//! value is served unchanged until its deadline passes, after which the next
//! read recomputes and replaces it. Bounded staleness is the contract, not a
//! bug.
//!
//! Expiry is driven by an `Instant` passed explicitly to the `_at` variants
//! so it can be tested without sleeping; the plain `get`/`insert` use
//! `Instant::now()`.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// TTL cache with cloned-value reads
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (V, Instant)>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a cache whose entries live for `ttl` after insertion
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Configured time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return an unexpired value for `key`, if present
    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Store `value` under `key`, stamped to expire `ttl` from now
    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Clock-injected variant of [`TtlCache::get`]
    ///
    /// An entry whose deadline is at or before `now` is treated as absent
    /// and removed.
    pub fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((value, deadline)) if *deadline > now => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Clock-injected variant of [`TtlCache::insert`]
    pub fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, (value, now + self.ttl));
    }

    /// Drop all entries
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_within_ttl() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        let t0 = Instant::now();

        cache.insert_at("stats", 7, t0);
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(59)), Some(7));
    }

    #[test]
    fn test_expires_after_ttl() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        let t0 = Instant::now();

        cache.insert_at("stats", 7, t0);
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(60)), None);
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(120)), None);
    }

    #[test]
    fn test_stale_value_served_until_deadline() {
        // A newer value written elsewhere does not invalidate the entry
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        let t0 = Instant::now();

        cache.insert_at("stats", 7, t0);
        // Underlying data changed; cache still serves 7 until expiry
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(30)), Some(7));

        // After expiry the caller recomputes and replaces
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(61)), None);
        cache.insert_at("stats", 8, t0 + Duration::from_secs(61));
        assert_eq!(cache.get_at(&"stats", t0 + Duration::from_secs(62)), Some(8));
    }

    #[test]
    fn test_replace_restamps_deadline() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(10));
        let t0 = Instant::now();

        cache.insert_at("k", 1, t0);
        cache.insert_at("k", 2, t0 + Duration::from_secs(8));
        // Old deadline (t0+10) has passed but the re-insert restamped it
        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(15)), Some(2));
    }

    #[test]
    fn test_clear() {
        let cache: TtlCache<&str, i64> = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), None);
    }
}
