//! Bounded LRU store of rendered artifacts.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::CacheCapacity;
use crate::normalize::CacheKey;
use crate::render::Artifact;

/// Counters describing cache usage since creation (or the last [`CacheStore::clear`]
/// for `entries`/`bytes`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub bytes: usize,
}

/// Key to artifact map with least-recently-used eviction.
///
/// Every operation takes the lock once and never awaits while holding it, so lookups
/// are atomic with respect to other tasks.
pub struct CacheStore {
    capacity: CacheCapacity,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Access sequence -> key, oldest first.
    recency: BTreeMap<u64, CacheKey>,
    sequence: u64,
    bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

struct CacheEntry {
    artifact: Artifact,
    last_accessed: u64,
}

impl CacheState {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn touch(&mut self, key: &CacheKey) -> Option<Artifact> {
        let seq = self.next_sequence();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.last_accessed);
        entry.last_accessed = seq;
        self.recency.insert(seq, key.clone());
        Some(entry.artifact.clone())
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_accessed);
        self.bytes -= entry.artifact.byte_len();
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.bytes -= entry.artifact.byte_len();
            self.evictions += 1;
            debug!(key = ?key, "Evicted least recently used QR artifact");
        }
        true
    }

    fn fits(&self, capacity: CacheCapacity, incoming: usize) -> bool {
        match capacity {
            CacheCapacity::Entries(max) => self.entries.len() < max,
            CacheCapacity::Bytes(max) => self.bytes + incoming <= max,
        }
    }
}

impl CacheStore {
    pub fn new(capacity: CacheCapacity) -> Self {
        Self {
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn capacity(&self) -> CacheCapacity {
        self.capacity
    }

    /// Looks up `key`, marking it most recently used on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Artifact> {
        let mut state = self.state.lock();
        match state.touch(key) {
            Some(artifact) => {
                state.hits += 1;
                trace!(key = ?key, "QR cache hit");
                Some(artifact)
            }
            None => {
                state.misses += 1;
                trace!(key = ?key, "QR cache miss");
                None
            }
        }
    }

    /// Looks up `key` without touching recency or counters.
    pub fn peek(&self, key: &CacheKey) -> Option<Artifact> {
        self.state.lock().entries.get(key).map(|e| e.artifact.clone())
    }

    /// Inserts or replaces `key`, evicting least recently used entries to make room.
    ///
    /// An artifact that could never fit (larger than a byte budget, or a zero capacity)
    /// is not stored.
    pub fn put(&self, key: CacheKey, artifact: Artifact) {
        let cost = artifact.byte_len();
        let never_fits = match self.capacity {
            CacheCapacity::Entries(max) => max == 0,
            CacheCapacity::Bytes(max) => cost > max,
        };

        let mut state = self.state.lock();
        state.remove(&key);
        if never_fits {
            warn!(key = ?key, bytes = cost, capacity = ?self.capacity, "QR artifact exceeds cache capacity; not cached");
            return;
        }
        while !state.fits(self.capacity, cost) {
            if !state.evict_oldest() {
                break;
            }
        }
        let seq = state.next_sequence();
        state.recency.insert(seq, key.clone());
        state.bytes += cost;
        state.entries.insert(
            key,
            CacheEntry {
                artifact,
                last_accessed: seq,
            },
        );
    }

    /// Removes `key`; returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Drops every entry. Returns how many there were.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let cleared = state.entries.len();
        state.entries.clear();
        state.recency.clear();
        state.bytes = 0;
        debug!(cleared, "Cleared QR cache");
        cleared
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state.entries.len(),
            bytes: state.bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeBounds;
    use crate::normalize::normalize;
    use crate::request::GenerationRequest;

    fn key(value: &str) -> CacheKey {
        normalize(&GenerationRequest::new(value, 300), &SizeBounds::default()).unwrap().0
    }

    fn artifact(len: usize) -> Artifact {
        Artifact::from_data_uri("x".repeat(len))
    }

    #[test]
    fn test_get_and_put() {
        let cache = CacheStore::new(CacheCapacity::Entries(4));
        assert!(cache.get(&key("a")).is_none());
        cache.put(key("a"), artifact(10));
        assert_eq!(cache.get(&key("a")), Some(artifact(10)));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.bytes), (1, 1, 10));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = CacheStore::new(CacheCapacity::Entries(2));
        cache.put(key("a"), artifact(1));
        cache.put(key("b"), artifact(1));
        // Touching `a` makes `b` the oldest
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), artifact(1));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_untouched_entries_evict_in_insertion_order() {
        let cache = CacheStore::new(CacheCapacity::Entries(3));
        for v in ["a", "b", "c", "d", "e"] {
            cache.put(key(v), artifact(1));
        }
        assert!(!cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert!(cache.contains(&key("e")));
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let cache = CacheStore::new(CacheCapacity::Entries(2));
        cache.put(key("a"), artifact(1));
        cache.put(key("b"), artifact(1));
        assert!(cache.peek(&key("a")).is_some());
        cache.put(key("c"), artifact(1));
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_byte_budget() {
        let cache = CacheStore::new(CacheCapacity::Bytes(100));
        cache.put(key("a"), artifact(40));
        cache.put(key("b"), artifact(40));
        cache.put(key("c"), artifact(40));
        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.stats().bytes, 80);

        // Larger than the whole budget: rejected, nothing else disturbed
        cache.put(key("d"), artifact(101));
        assert!(!cache.contains(&key("d")));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_replacing_a_key_updates_bytes() {
        let cache = CacheStore::new(CacheCapacity::Bytes(100));
        cache.put(key("a"), artifact(60));
        cache.put(key("a"), artifact(30));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().bytes, 30);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = CacheStore::new(CacheCapacity::Entries(0));
        cache.put(key("a"), artifact(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_and_remove() {
        let cache = CacheStore::new(CacheCapacity::Entries(8));
        cache.put(key("a"), artifact(5));
        cache.put(key("b"), artifact(5));
        assert!(cache.remove(&key("a")));
        assert!(!cache.remove(&key("a")));
        assert_eq!(cache.clear(), 1);
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.stats().bytes, 0);
    }
}
