//! Bounded cache with TTL expiry and FIFO eviction.
//!
//! Staleness is bounded by the TTL only: an entry is visible while
//! `age < ttl`, is removed lazily on the first read past that point, and is
//! removed proactively by [`BoundedCache::sweep_expired`]. Size is bounded by
//! the capacity: inserting a new key at capacity evicts the oldest-inserted
//! entry, regardless of how often it was read.
//!
//! # Example
//!
//! ```ignore
//! let mut cache = BoundedCache::new(1000, Duration::from_secs(300));
//! cache.put(query.cache_key(), payload);
//!
//! match cache.get(&query.cache_key()) {
//!     CacheLookup::Hit { value, .. } => return Ok(value),
//!     CacheLookup::Miss => { /* fetch upstream */ }
//! }
//! ```

pub mod bounded;
pub mod traits;

pub use bounded::{BoundedCache, SearchCache};
pub use traits::{CacheLookup, CacheStats};
