use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// A fixed-capacity LRU cache with optional per-entry time-to-live.
///
/// Recency is tracked by an intrusive doubly-linked list threaded through a
/// slab of slots, with a hash map from key to slot index -- nodes are removed
/// explicitly on eviction, no shared ownership involved. The least recently
/// used entry sits at the list head, the most recently touched at the tail.
///
/// Expired entries are treated as absent on lookup and purged lazily at that
/// point. A TTL of zero disables time expiry entirely; capacity eviction
/// still applies.
pub struct TtlCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    capacity: usize,
    ttl: Duration,
}

struct Inner<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

struct Node<K, V> {
    key: K,
    value: V,
    expires_at: Option<Instant>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries, each living for
    /// `ttl` after its last write. `Duration::ZERO` means no time expiry.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "TtlCache capacity must be greater than zero");
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::with_capacity(capacity),
                slots: Vec::new(),
                free: Vec::new(),
                head: None,
                tail: None,
            }),
            capacity,
            ttl,
        }
    }

    /// Looks up `key`, promoting the entry to most recently used on a hit.
    ///
    /// An expired entry is purged and reported as absent.
    pub fn try_get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().expect("ttl cache lock poisoned");

        let idx = *inner.map.get(key)?;
        if inner.node(idx).is_expired() {
            inner.remove_index(idx);
            return None;
        }

        inner.unlink(idx);
        inner.push_tail(idx);
        Some(inner.node(idx).value.clone())
    }

    /// Inserts or updates `key`, renewing its TTL and promoting it to most
    /// recently used. Inserting a new key at capacity evicts the least
    /// recently used entry first.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.write().expect("ttl cache lock poisoned");
        let expires_at = self.expiry();

        if let Some(&idx) = inner.map.get(&key) {
            let node = inner.node_mut(idx);
            node.value = value;
            node.expires_at = expires_at;
            inner.unlink(idx);
            inner.push_tail(idx);
            return;
        }

        while inner.map.len() >= self.capacity {
            match inner.head {
                Some(lru) => inner.remove_index(lru),
                None => break,
            }
        }

        let idx = inner.alloc(Node {
            key: key.clone(),
            value,
            expires_at,
            prev: None,
            next: None,
        });
        inner.push_tail(idx);
        inner.map.insert(key, idx);
    }

    pub fn delete(&self, key: &K) {
        let mut inner = self.inner.write().expect("ttl cache lock poisoned");
        if let Some(&idx) = inner.map.get(key) {
            inner.remove_index(idx);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("ttl cache lock poisoned");
        inner.map.clear();
        inner.slots.clear();
        inner.free.clear();
        inner.head = None;
        inner.tail = None;
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("ttl cache lock poisoned").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the keys currently present, expired or not.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.read().expect("ttl cache lock poisoned");
        inner.map.keys().cloned().collect()
    }

    fn expiry(&self) -> Option<Instant> {
        if self.ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + self.ttl)
        }
    }
}

impl<K, V> Node<K, V> {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn node(&self, idx: usize) -> &Node<K, V> {
        self.slots[idx].as_ref().expect("slot index points at a live node")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.slots[idx].as_mut().expect("slot index points at a live node")
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Detaches a node from the recency list without freeing its slot.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    /// Appends a detached node at the tail (most recently used).
    fn push_tail(&mut self, idx: usize) {
        match self.tail {
            Some(t) => {
                self.node_mut(t).next = Some(idx);
                self.node_mut(idx).prev = Some(t);
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    /// Removes a node entirely: list, map, and slot.
    fn remove_index(&mut self, idx: usize) {
        self.unlink(idx);
        if let Some(node) = self.slots[idx].take() {
            self.map.remove(&node.key);
        }
        self.free.push(idx);
    }
}
