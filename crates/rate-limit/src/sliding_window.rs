use std::sync::Mutex;
use std::time::{Duration, Instant};

use appshield_cache::TtlCache;

/// Default number of `(route, identity)` keys tracked at once.
pub const DEFAULT_KEY_CAPACITY: usize = 10_000;

/// Default key TTL: two hours, long enough to outlive any realistic window.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(120 * 60);

/// Per-key sliding-window request tracking.
///
/// Each key owns the list of request timestamps (monotonic milliseconds) seen
/// inside its window; stale timestamps are pruned on every check. The backing
/// [`TtlCache`] bounds how many distinct keys can exist, and its TTL reclaims
/// keys from one-off clients.
pub struct SlidingWindow {
    entries: TtlCache<String, Vec<i64>>,
    // Request threads race on the same key; the prune-append-store cycle
    // must be a single critical section.
    lock: Mutex<()>,
    epoch: Instant,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_KEY_CAPACITY, DEFAULT_KEY_TTL)
    }

    pub fn with_capacity(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: TtlCache::new(capacity, ttl),
            lock: Mutex::new(()),
            epoch: Instant::now(),
        }
    }

    /// Checks whether a request under `key` fits inside the sliding window.
    ///
    /// `max_requests == 0` denies everything; `window_ms == 0` disables
    /// limiting and allows everything. Both are defined behaviors.
    pub fn is_allowed(&self, key: &str, window_ms: u64, max_requests: u64) -> bool {
        if max_requests == 0 {
            return false;
        }
        if window_ms == 0 {
            return true;
        }

        let now = self.now_ms();
        let _guard = self.lock.lock().expect("sliding window lock poisoned");

        let mut timestamps = match self.entries.try_get(&key.to_string()) {
            Some(list) => list,
            None => {
                self.entries.set(key.to_string(), vec![now]);
                return true;
            }
        };

        timestamps.retain(|&ts| now - ts <= window_ms as i64);
        timestamps.push(now);
        let count = timestamps.len() as u64;
        // Store back, refreshing both TTL and recency.
        self.entries.set(key.to_string(), timestamps);

        count <= max_requests
    }

    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        let _guard = self.lock.lock().expect("sliding window lock poisoned");
        self.entries.clear();
    }

    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}
