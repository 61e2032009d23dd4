use chrono::{DateTime, Utc};
use ensemble_core::{EnsembleError, EnsembleResult, Task};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Default number of entries kept by a [`TaskCache`].
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache sizing, deserialized from the `[cache]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Derive the cache key for a piece of task content: the SHA-256 hex digest
/// of the trimmed text.
///
/// Empty or whitespace-only content cannot identify a task and is rejected
/// with [`EnsembleError::Config`].
pub fn cache_key(content: &str) -> EnsembleResult<String> {
    let normalized = content.trim();
    if normalized.is_empty() {
        return Err(EnsembleError::Config(
            "cannot derive a cache key from empty task content".to_string(),
        ));
    }
    Ok(hex::encode(Sha256::digest(normalized.as_bytes())))
}

/// A stored result with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Content digest.
    pub key: String,
    /// Cached result.
    pub value: V,
    /// Last time the entry was read or written.
    pub last_access: DateTime<Utc>,
    tick: u64,
}

/// Point-in-time counters for a [`TaskCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries currently held.
    pub len: usize,
    /// Maximum entries.
    pub capacity: usize,
}

struct LruState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    // tick -> key, oldest first
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl<V> LruState<V> {
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            entry.last_access = Utc::now();
            self.order.insert(tick, key.to_string());
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Content-addressed, bounded, least-recently-used result cache.
///
/// Two tasks with the same trimmed content share an entry regardless of id or
/// metadata. All bookkeeping happens under one lock, so a `put` followed by a
/// `get` from any flow observes the write.
pub struct TaskCache<V> {
    capacity: usize,
    state: Mutex<LruState<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TaskCache<V> {
    /// Create a cache holding at most `capacity` entries. A capacity of zero
    /// is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("cache capacity 0 is unusable, using 1");
            1
        } else {
            capacity
        };
        Self {
            capacity,
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Create a cache from config.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Look up the result for `task`, marking it most recently used on a hit.
    pub fn get(&self, task: &Task) -> EnsembleResult<Option<V>> {
        self.get_by_content(&task.content)
    }

    /// Look up by raw content.
    pub fn get_by_content(&self, content: &str) -> EnsembleResult<Option<V>> {
        let key = cache_key(content)?;
        let mut state = self.state.lock();
        state.touch(&key);
        match state.entries.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value.clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store `value` as the result for `task`. On a full cache the least
    /// recently used entry is evicted first.
    pub fn put(&self, task: &Task, value: V) -> EnsembleResult<()> {
        self.put_by_content(&task.content, value)
    }

    /// Store by raw content.
    pub fn put_by_content(&self, content: &str, value: V) -> EnsembleResult<()> {
        let key = cache_key(content)?;
        let mut state = self.state.lock();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            state.touch(&key);
            return Ok(());
        }

        if state.entries.len() >= self.capacity {
            if let Some(evicted) = state.evict_oldest() {
                debug!(key = %evicted, "evicted least recently used cache entry");
            }
        }

        let tick = state.next_tick;
        state.next_tick += 1;
        state.order.insert(tick, key.clone());
        state.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                last_access: Utc::now(),
                tick,
            },
        );
        Ok(())
    }

    /// Whether an entry exists for `task`. Does not affect recency.
    pub fn contains(&self, task: &Task) -> EnsembleResult<bool> {
        let key = cache_key(&task.content)?;
        Ok(self.state.lock().entries.contains_key(&key))
    }

    /// Snapshot of an entry without touching it.
    pub fn peek_entry(&self, task: &Task) -> EnsembleResult<Option<CacheEntry<V>>> {
        let key = cache_key(&task.content)?;
        Ok(self.state.lock().entries.get(&key).cloned())
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity,
        }
    }
}

impl<V: Clone> Default for TaskCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn task(content: &str) -> Task {
        Task::new(content)
    }

    #[test]
    fn test_same_content_different_id_hits() {
        let cache = TaskCache::new(4);
        let t1 = task("summarize file X").with_id("a");
        let t2 = task("  summarize file X  ")
            .with_id("b")
            .with_metadata("k", serde_json::json!(1));
        cache.put(&t1, "done".to_string()).unwrap();
        assert_eq!(cache.get(&t2).unwrap().as_deref(), Some("done"));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = TaskCache::new(2);
        cache.put(&task("a"), 1).unwrap();
        cache.put(&task("b"), 2).unwrap();
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get(&task("a")).unwrap(), Some(1));
        cache.put(&task("c"), 3).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&task("a")).unwrap());
        assert!(!cache.contains(&task("b")).unwrap());
        assert!(cache.contains(&task("c")).unwrap());
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = TaskCache::new(2);
        cache.put(&task("a"), 1).unwrap();
        cache.put(&task("b"), 2).unwrap();
        cache.put(&task("a"), 10).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&task("a")).unwrap(), Some(10));
        assert_eq!(cache.get(&task("b")).unwrap(), Some(2));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let cache = TaskCache::new(3);
        for i in 0..50 {
            cache.put(&task(&format!("task {i}")), i).unwrap();
            assert!(cache.len() <= 3);
        }
        assert!(cache.contains(&task("task 49")).unwrap());
        assert!(!cache.contains(&task("task 46")).unwrap());
    }

    #[test]
    fn test_empty_content_is_config_error() {
        let cache: TaskCache<u8> = TaskCache::new(2);
        let err = cache.put(&task("   "), 1).unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
        assert!(cache.get(&task("")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hit_miss_counters_and_clear() {
        let cache = TaskCache::new(2);
        cache.put(&task("x"), 1).unwrap();
        cache.get(&task("x")).unwrap();
        cache.get(&task("y")).unwrap();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let cache = TaskCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put(&task("a"), 1).unwrap();
        cache.put(&task("b"), 2).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_is_sha256_hex() {
        let key = cache_key(" abc ").unwrap();
        assert_eq!(
            key,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_entry_tracks_last_access() {
        let cache = TaskCache::new(2);
        let t = task("a");
        cache.put(&t, 1).unwrap();
        let before = cache.peek_entry(&t).unwrap().unwrap().last_access;
        cache.get(&t).unwrap();
        let after = cache.peek_entry(&t).unwrap().unwrap().last_access;
        assert!(after >= before);
    }
}
