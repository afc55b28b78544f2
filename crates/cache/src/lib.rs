//! Bounded concurrent caches for the appshield agent.
//!
//! Two eviction policies live here, serving deliberately different purposes:
//!
//! - [`LfuCache`] -- a fixed-capacity concurrent map that evicts the least
//!   frequently used entry. Values carry an explicit [`HitCount`] that is
//!   incremented on write-through only, never on plain reads. Used for the
//!   long-lived popularity-weighted tracking of hostnames, users, and routes.
//!
//! - [`TtlCache`] -- a fixed-capacity LRU with per-entry time-to-live,
//!   backed by a slab-allocated intrusive recency list. Used for short-lived
//!   recency-weighted bookkeeping such as rate-limit windows.
//!
//! Both keep `len() <= capacity` after every public operation returns, no
//! matter how callers interleave.

pub mod hit_count;
pub mod lfu;
pub mod ttl_lru;

pub use hit_count::{HitCount, HitCounted};
pub use lfu::LfuCache;
pub use ttl_lru::TtlCache;
