//! Read results and statistics shared by cache implementations.

use serde::Serialize;
use std::time::Duration;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    /// Entry present and younger than the TTL.
    Hit {
        value: V,
        /// Time since the entry was inserted.
        age: Duration,
    },
    /// Entry absent, or expired and now removed.
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    /// Consume the lookup, keeping the value of a hit.
    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Hit { value, .. } => Some(value),
            Self::Miss => None,
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired reads included.
    pub misses: u64,
    /// Number of entries currently held, expired-but-unswept included.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
    /// Entries removed to make room for a new key.
    pub evictions: u64,
    /// Entries removed by a read past their TTL.
    pub expirations: u64,
    /// Completed sweep passes.
    pub sweeps: u64,
    /// Entries removed by sweep passes.
    pub entries_swept: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of the capacity in use (0.0 to 1.0).
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.entries as f64 / self.capacity as f64
        }
    }
}
