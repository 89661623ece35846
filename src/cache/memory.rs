// src/cache/memory.rs
use dashmap::DashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct CacheEntry<V> {
    value: V,
    deadline: Instant,
    ttl: Duration,
    sliding: bool,
}

/// Bounded in-memory cache with per-entry TTLs. Entries expire on their own;
/// when the capacity bound is hit, expired entries are purged first and the
/// entry closest to its deadline is evicted next. Concurrent readers and
/// writers are safe; a race between two writers of the same key is resolved
/// last-writer-wins.
pub struct ResultCache<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
    max_entries: usize,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
        }
    }

    /// Returns the cached value if present and not expired. Sliding entries
    /// have their deadline pushed out by one TTL on every hit.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            if let Some(mut entry) = self.entries.get_mut(key) {
                let now = Instant::now();
                if now < entry.deadline {
                    if entry.sliding {
                        entry.deadline = now + entry.ttl;
                    }
                    return Some(entry.value.clone());
                }
            } else {
                return None;
            }
        }
        // Expired: drop it so the map only holds live entries.
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: K, value: V, ttl: Duration, sliding: bool) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_nearest_deadline();
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                deadline: Instant::now() + ttl,
                ttl,
                sliding,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now < entry.deadline);
    }

    /// Victim selection: the entry that would expire soonest is the least
    /// valuable one to keep.
    fn evict_nearest_deadline(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|e| e.value().deadline)
            .map(|e| e.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn entries_expire_after_ttl() {
        let cache: ResultCache<&str, u32> = ResultCache::new(16);
        cache.insert("k", 7, Duration::from_millis(40), false);
        assert_eq!(cache.get(&"k"), Some(7));
        sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn independent_ttls_per_entry() {
        let cache: ResultCache<&str, u32> = ResultCache::new(16);
        cache.insert("short", 1, Duration::from_millis(30), false);
        cache.insert("long", 2, Duration::from_millis(200), false);
        sleep(Duration::from_millis(60));
        assert_eq!(cache.get(&"short"), None);
        assert_eq!(cache.get(&"long"), Some(2));
    }

    #[test]
    fn sliding_entries_extend_on_access() {
        let cache: ResultCache<&str, u32> = ResultCache::new(16);
        cache.insert("k", 9, Duration::from_millis(80), true);
        // Keep touching it past the original deadline.
        for _ in 0..4 {
            sleep(Duration::from_millis(50));
            assert_eq!(cache.get(&"k"), Some(9));
        }
        sleep(Duration::from_millis(120));
        assert_eq!(cache.get(&"k"), None);
    }

    #[test]
    fn capacity_bound_is_respected() {
        let cache: ResultCache<u32, u32> = ResultCache::new(4);
        for i in 0..10 {
            cache.insert(i, i, Duration::from_secs(60), false);
        }
        assert!(cache.len() <= 4);
        assert_eq!(cache.get(&9), Some(9));
    }

    #[test]
    fn expired_entries_are_purged_before_live_ones_are_evicted() {
        let cache: ResultCache<u32, u32> = ResultCache::new(2);
        cache.insert(1, 1, Duration::from_millis(20), false);
        cache.insert(2, 2, Duration::from_secs(60), false);
        sleep(Duration::from_millis(40));
        cache.insert(3, 3, Duration::from_secs(60), false);
        assert_eq!(cache.get(&2), Some(2));
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn rewriting_a_key_replaces_the_value() {
        let cache: ResultCache<&str, u32> = ResultCache::new(16);
        cache.insert("k", 1, Duration::from_secs(60), false);
        cache.insert("k", 2, Duration::from_secs(60), false);
        assert_eq!(cache.get(&"k"), Some(2));
    }
}
