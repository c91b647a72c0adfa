//! Bounded in-memory caches and per-path write locks.
//!
//! Capacities here are small (tens of entries), so the LRU bookkeeping is a
//! monotonic touch counter with a linear eviction scan rather than a linked
//! structure.

use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Bounded map with least-recently-used eviction. `get` counts as a use.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    tick: u64,
    map: HashMap<K, (V, u64)>,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LruCache capacity must be non-zero");
        Self {
            capacity,
            tick: 0,
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.tick += 1;
        let tick = self.tick;
        match self.map.get_mut(key) {
            Some((value, used)) => {
                *used = tick;
                Some(&*value)
            }
            None => None,
        }
    }

    /// Insert a value, returning the evicted entry when the cache was full.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.tick += 1;
        if self.map.contains_key(&key) {
            self.map.insert(key, (value, self.tick));
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };
        self.map.insert(key, (value, self.tick));
        evicted
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(value, _)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.map.values().map(|(value, _)| value)
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let oldest = self
            .map
            .iter()
            .min_by_key(|(_, (_, used))| *used)
            .map(|(key, _)| key.clone())?;
        let (value, _) = self.map.remove(&oldest)?;
        Some((oldest, value))
    }
}

/// LRU cache whose entries also expire after a fixed TTL.
#[derive(Debug)]
pub struct TtlLruCache<K, V> {
    inner: LruCache<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V> TtlLruCache<K, V> {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: LruCache::new(capacity),
            ttl,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        let expired = match self.inner.get(key) {
            Some((_, stored)) => stored.elapsed() > self.ttl,
            None => return None,
        };
        if expired {
            self.inner.remove(key);
            return None;
        }
        self.inner.get(key).map(|(value, _)| value)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.inner
            .insert(key, (value, Instant::now()))
            .map(|(key, (value, _))| (key, value))
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|(value, _)| value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Lazily-created per-path locks serializing file writes.
///
/// The outer mutex is a plain std `Mutex` so the map can be touched from
/// outside a running event loop (manager construction, shutdown paths); the
/// inner locks are tokio mutexes held across await points while writing.
#[derive(Debug, Default)]
pub struct PathLocks {
    map: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the lock for a path.
    pub fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.map.lock().expect("path lock map poisoned");
        map.entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop locks for paths under `prefix`; called when a project is evicted.
    pub fn prune_prefix(&self, prefix: &Path) {
        let mut map = self.map.lock().expect("path lock map poisoned");
        map.retain(|path, _| !path.starts_with(prefix));
    }

    pub fn len(&self) -> usize {
        self.map.lock().expect("path lock map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");

        let evicted = cache.insert("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn lru_reinsert_does_not_evict() {
        let mut cache = LruCache::new(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert!(cache.insert("a", 10).is_none());
        assert_eq!(cache.get(&"a"), Some(&10));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn ttl_cache_expires_entries() {
        let mut cache = TtlLruCache::new(4, Duration::from_millis(0));
        cache.insert("k", 1);
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get(&"k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_cache_serves_fresh_entries() {
        let mut cache = TtlLruCache::new(4, Duration::from_secs(60));
        cache.insert("k", 7);
        assert_eq!(cache.get(&"k"), Some(&7));
    }

    #[test]
    fn path_locks_are_shared_per_path() {
        let locks = PathLocks::new();
        let first = locks.lock_for(Path::new("/tmp/a"));
        let second = locks.lock_for(Path::new("/tmp/a"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn path_locks_prune_by_prefix() {
        let locks = PathLocks::new();
        locks.lock_for(Path::new("/projects/p1/state.json"));
        locks.lock_for(Path::new("/projects/p1/error_index.json"));
        locks.lock_for(Path::new("/projects/p2/state.json"));

        locks.prune_prefix(Path::new("/projects/p1"));
        assert_eq!(locks.len(), 1);
    }
}
