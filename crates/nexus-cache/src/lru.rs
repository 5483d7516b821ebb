//! LRU (Least Recently Used) Cache implementation.
//!
//! Entries live in a slab of slots linked into a recency list by index, so
//! get, insert and eviction are O(1) without raw pointers.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

use crate::stats::CacheStats;

/// Sentinel for "no slot".
const NIL: usize = usize::MAX;

/// A slot in the recency list.
struct Slot<K, V> {
    key: K,
    value: V,
    prev: usize,
    next: usize,
}

/// A bounded LRU cache.
///
/// # Example
///
/// ```
/// use nexus_cache::lru::LruCache;
///
/// let mut cache = LruCache::new(2);
/// cache.insert("a", 1);
/// cache.insert("b", 2);
/// assert_eq!(cache.get(&"a"), Some(&1));
///
/// // Adding a third item evicts "b" (least recently used)
/// cache.insert("c", 3);
/// assert_eq!(cache.get(&"b"), None);
/// ```
pub struct LruCache<K, V> {
    capacity: usize,
    map: HashMap<K, usize>,
    slots: Vec<Slot<K, V>>,
    /// Most recently used slot.
    head: usize,
    /// Least recently used slot.
    tail: usize,
    stats: CacheStats,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates a new LRU cache with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            stats: CacheStats::new(),
        }
    }

    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the maximum capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Gets a reference to the value for the given key, marking it as
    /// recently used.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key).copied() {
            Some(slot) => {
                self.stats.record_hit();
                self.move_to_front(slot);
                Some(&self.slots[slot].value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Checks if the cache contains the given key without updating recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Inserts a key-value pair, returning the previous value for the key.
    ///
    /// When the cache is full, the least recently used entry is overwritten.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.stats.record_insert();

        if let Some(&slot) = self.map.get(&key) {
            self.move_to_front(slot);
            return Some(std::mem::replace(&mut self.slots[slot].value, value));
        }

        let slot = if self.map.len() >= self.capacity {
            // Reuse the tail slot in place.
            let slot = self.tail;
            self.stats.record_eviction();
            self.unlink(slot);
            let old_key = std::mem::replace(&mut self.slots[slot].key, key.clone());
            self.map.remove(&old_key);
            self.slots[slot].value = value;
            slot
        } else {
            self.slots.push(Slot {
                key: key.clone(),
                value,
                prev: NIL,
                next: NIL,
            });
            self.slots.len() - 1
        };

        self.push_front(slot);
        self.map.insert(key, slot);
        None
    }

    /// Clears all entries from the cache.
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn move_to_front(&mut self, slot: usize) {
        if slot == self.head {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }

    fn push_front(&mut self, slot: usize) {
        self.slots[slot].prev = NIL;
        self.slots[slot].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    fn unlink(&mut self, slot: usize) {
        let prev = self.slots[slot].prev;
        let next = self.slots[slot].next;

        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }

        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
    }
}

/// A thread-safe wrapper around [`LruCache`] handing out clones.
pub struct SyncLruCache<K, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> SyncLruCache<K, V> {
    /// Creates a new synchronized LRU cache.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Gets a value from the cache.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().get(key).cloned()
    }

    /// Inserts a value into the cache.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.lock().insert(key, value)
    }

    /// Returns the current size.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Clears the cache.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Copies the cache statistics.
    pub fn stats(&self) -> crate::stats::CacheStatsSnapshot {
        self.inner.lock().stats().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut cache = LruCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_eviction() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(&2));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.stats().snapshot().evictions, 1);
    }

    #[test]
    fn test_access_updates_recency() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a");
        cache.insert("c", 3);

        assert!(cache.contains(&"a"));
        assert!(!cache.contains(&"b"));
        assert!(cache.contains(&"c"));
    }

    #[test]
    fn test_update_existing() {
        let mut cache = LruCache::new(2);

        cache.insert("a", 1);
        assert_eq!(cache.insert("a", 10), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"a"), Some(&10));
    }

    #[test]
    fn test_capacity_one_churn() {
        let mut cache = LruCache::new(0);
        assert_eq!(cache.capacity(), 1);

        for i in 0..10 {
            cache.insert(i, i * 2);
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.get(&i), Some(&(i * 2)));
        }
        assert_eq!(cache.get(&0), None);
    }

    #[test]
    fn test_hit_miss_counters() {
        let mut cache = LruCache::new(4);
        cache.insert(1u64, "one");

        cache.get(&1);
        cache.get(&2);
        cache.get(&1);

        let snap = cache.stats().snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
    }

    #[test]
    fn test_clear() {
        let mut cache = LruCache::new(4);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();

        assert!(cache.is_empty());
        cache.insert("c", 3);
        assert_eq!(cache.get(&"c"), Some(&3));
    }

    #[test]
    fn test_sync_cache() {
        let cache = SyncLruCache::new(2);
        cache.insert("k".to_string(), vec![1, 2]);

        assert_eq!(cache.get("k"), Some(vec![1, 2]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }
}
