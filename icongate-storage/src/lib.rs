//! icongate Storage - In-Memory Result Cache
//!
//! Holds search payloads between upstream fetches. The cache is a plain
//! single-owner structure; callers that share it across tasks wrap it in a
//! mutex and never hold the lock across an await.

pub mod cache;

pub use cache::{BoundedCache, CacheLookup, CacheStats, SearchCache};
