use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing hit counter embedded in LFU cache values.
///
/// The counter starts at zero and is incremented exactly once per successful
/// write-through; plain lookups never touch it. It only ever decreases via an
/// explicit [`reset`](HitCount::reset).
#[derive(Debug, Default)]
pub struct HitCount(AtomicU64);

impl HitCount {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    /// Overwrites the counter. Used when a cache entry is replaced in place
    /// and the accumulated hit history must carry over to the replacement.
    pub fn set(&self, hits: u64) {
        self.0.store(hits, Ordering::Relaxed);
    }
}

impl Clone for HitCount {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.get()))
    }
}

impl serde::Serialize for HitCount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get())
    }
}

/// Composition bound for values stored in an [`LfuCache`](crate::LfuCache):
/// any such value exposes its embedded [`HitCount`].
pub trait HitCounted {
    fn hit_count(&self) -> &HitCount;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero_and_increments() {
        let hits = HitCount::new();
        assert_eq!(hits.get(), 0);
        hits.increment();
        hits.increment();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn reset_returns_to_zero() {
        let hits = HitCount::new();
        hits.increment();
        hits.reset();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn clone_snapshots_current_value() {
        let hits = HitCount::new();
        hits.increment();
        let copy = hits.clone();
        hits.increment();
        assert_eq!(copy.get(), 1);
        assert_eq!(hits.get(), 2);
    }
}
