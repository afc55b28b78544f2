use std::hash::Hash;
use std::sync::Mutex;

use dashmap::DashMap;

use crate::hit_count::HitCounted;

/// A fixed-capacity concurrent map that evicts the least frequently used
/// entry when a new key would exceed capacity.
///
/// Frequency is the value's embedded hit count, incremented by
/// [`add_or_update`](LfuCache::add_or_update) and [`upsert`](LfuCache::upsert)
/// only -- [`get`](LfuCache::get) never mutates it. The capacity check,
/// eviction scan, and insert happen under a single writer lock so the
/// capacity invariant holds under concurrent inserts; plain reads go straight
/// to the underlying map and never take that lock.
pub struct LfuCache<K, V> {
    map: DashMap<K, V>,
    capacity: usize,
    // Held across "check capacity -> evict -> insert".
    write_lock: Mutex<()>,
}

impl<K, V> LfuCache<K, V>
where
    K: Eq + Hash + Clone,
    V: HitCounted + Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; that is a programmer error, caught at
    /// construction rather than at use.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LfuCache capacity must be greater than zero");
        Self {
            map: DashMap::new(),
            capacity,
            write_lock: Mutex::new(()),
        }
    }

    /// Looks up a value without touching its hit count.
    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Inserts or replaces the value for `key`, then increments its hit
    /// count. Replacing an existing entry carries the accumulated hit history
    /// into the new value. Returns a snapshot of the stored value.
    pub fn add_or_update(&self, key: K, value: V) -> V {
        let _guard = self.write_lock.lock().expect("lfu write lock poisoned");

        let prior_hits = self.map.get(&key).map(|e| e.hit_count().get());
        match prior_hits {
            Some(hits) => value.hit_count().set(hits),
            None => {
                if self.map.len() >= self.capacity {
                    self.evict_least_used();
                }
            }
        }
        value.hit_count().increment();
        self.map.insert(key, value.clone());
        value
    }

    /// Inserts via `insert` when `key` is absent, otherwise refreshes the
    /// existing entry in place via `update` -- keeping its hit history. The
    /// hit count is incremented once either way.
    pub fn upsert<F, G>(&self, key: K, insert: F, update: G) -> V
    where
        F: FnOnce() -> V,
        G: FnOnce(&mut V),
    {
        let _guard = self.write_lock.lock().expect("lfu write lock poisoned");

        if let Some(mut entry) = self.map.get_mut(&key) {
            update(entry.value_mut());
            entry.hit_count().increment();
            return entry.value().clone();
        }

        if self.map.len() >= self.capacity {
            self.evict_least_used();
        }
        let value = insert();
        value.hit_count().increment();
        self.map.insert(key, value.clone());
        value
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.map.remove(key).map(|(_, v)| v)
    }

    pub fn clear(&self) {
        let _guard = self.write_lock.lock().expect("lfu write lock poisoned");
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Snapshot of the keys currently present.
    pub fn keys(&self) -> Vec<K> {
        self.map.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot of the values currently present.
    pub fn values(&self) -> Vec<V> {
        self.map.iter().map(|e| e.value().clone()).collect()
    }

    /// Removes the entry with the globally minimum hit count. Ties go to the
    /// first entry encountered in map iteration order, which is
    /// implementation-defined. Caller holds the write lock.
    fn evict_least_used(&self) {
        let mut victim: Option<(K, u64)> = None;
        for entry in self.map.iter() {
            let hits = entry.hit_count().get();
            match &victim {
                Some((_, min)) if *min <= hits => {}
                _ => victim = Some((entry.key().clone(), hits)),
            }
        }
        if let Some((key, hits)) = victim {
            self.map.remove(&key);
            tracing::debug!(hits, "evicted least frequently used cache entry");
        }
    }
}
