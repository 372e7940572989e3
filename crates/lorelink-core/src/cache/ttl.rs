//! Small in-process cache with per-entry expiry
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can advance past TTLs deterministically. A TTL too large to represent as
//! an instant never expires. Expired entries are swept whenever the map
//! doubles past its last swept size, so keys that are never read again do not
//! pile up.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Size below which inserts never sweep
const MIN_SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    /// `None` when the TTL overflowed the clock
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug)]
struct Entries<K, V> {
    map: HashMap<K, Slot<V>>,
    sweep_at: usize,
}

impl<K: Eq + Hash, V> Entries<K, V> {
    fn sweep(&mut self, now: Instant) -> usize {
        self.map.retain(|_, slot| slot.is_live(now));
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_THRESHOLD);
        self.map.len()
    }

    fn put(&mut self, key: K, slot: Slot<V>, now: Instant) {
        if self.map.len() >= self.sweep_at {
            self.sweep(now);
        }
        self.map.insert(key, slot);
    }
}

/// Thread-safe map whose entries disappear after their TTL
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<Entries<K, V>>,
}

impl<K, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                sweep_at: MIN_SWEEP_THRESHOLD,
            }),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a live entry
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let now = Instant::now();
        match entries.map.get(key) {
            Some(slot) if slot.is_live(now) => Some(slot.value.clone()),
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace an entry
    pub fn insert(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        self.lock().put(key, Slot::new(value, now, ttl), now);
    }

    /// Remove an entry, returning whether a live one existed
    pub fn remove(&self, key: &K) -> bool {
        let now = Instant::now();
        self.lock()
            .map
            .remove(key)
            .is_some_and(|slot| slot.is_live(now))
    }

    /// Drop expired entries and return how many remain
    pub fn purge_expired(&self) -> usize {
        self.lock().sweep(Instant::now())
    }

    pub fn len(&self) -> usize {
        self.purge_expired()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().map.clear();
    }
}

impl<K: Eq + Hash, V: Clone + PartialEq> TtlCache<K, V> {
    /// Atomically replace the entry if its live value equals `expected`
    ///
    /// `expected == None` means "only if absent or expired".
    pub fn compare_and_swap(&self, key: K, expected: Option<&V>, new: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        let current = entries
            .map
            .get(&key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| &slot.value);

        if current != expected {
            return false;
        }

        entries.put(key, Slot::new(new, now, ttl), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache: TtlCache<String, u32> = TtlCache::new();
        cache.insert("a".into(), 1, Duration::from_secs(10));

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_swap() {
        let cache: TtlCache<&str, String> = TtlCache::new();
        let ttl = Duration::from_secs(60);

        assert!(cache.compare_and_swap("k", None, "one".into(), ttl));
        assert!(!cache.compare_and_swap("k", None, "two".into(), ttl));
        assert!(!cache.compare_and_swap("k", Some(&"zero".to_string()), "two".into(), ttl));
        assert!(cache.compare_and_swap("k", Some(&"one".to_string()), "two".into(), ttl));
        assert_eq!(cache.get(&"k"), Some("two".to_string()));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.compare_and_swap("k", None, "three".into(), ttl));
    }

    #[tokio::test]
    async fn test_remove() {
        let cache: TtlCache<u8, u8> = TtlCache::new();
        cache.insert(1, 1, Duration::from_secs(5));
        assert!(cache.remove(&1));
        assert!(!cache.remove(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_never_expires() {
        let cache: TtlCache<&str, u8> = TtlCache::new();
        cache.insert("forever", 1, Duration::MAX);
        assert!(cache.compare_and_swap("cas", None, 2, Duration::from_secs(u64::MAX)));

        tokio::time::advance(Duration::from_secs(10 * 365 * 24 * 3600)).await;
        assert_eq!(cache.get(&"forever"), Some(1));
        assert_eq!(cache.get(&"cas"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inserts_sweep_expired_entries() {
        let cache: TtlCache<usize, usize> = TtlCache::new();
        for i in 0..MIN_SWEEP_THRESHOLD {
            cache.insert(i, i, Duration::from_secs(1));
        }
        assert_eq!(cache.lock().map.len(), MIN_SWEEP_THRESHOLD);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.insert(usize::MAX, 0, Duration::from_secs(60));

        // nothing read the stale keys, the insert alone dropped them
        assert_eq!(cache.lock().map.len(), 1);
        assert_eq!(cache.get(&usize::MAX), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_entries_raise_the_sweep_threshold() {
        let cache: TtlCache<usize, usize> = TtlCache::new();
        for i in 0..MIN_SWEEP_THRESHOLD * 3 {
            cache.insert(i, i, Duration::from_secs(60));
        }
        assert_eq!(cache.lock().map.len(), MIN_SWEEP_THRESHOLD * 3);
        assert!(cache.lock().sweep_at > MIN_SWEEP_THRESHOLD * 3);
    }
}
