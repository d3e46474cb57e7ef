//! FIFO-bounded cache with per-entry TTL.
//!
//! Entries live in a hash map; insertion order is tracked separately as a
//! queue of `(sequence, key)` records. Overwrites and removals leave stale
//! records behind in the queue. A record is live only while its sequence
//! matches the entry's, so eviction skips stale records and the queue is
//! compacted once stale records outnumber live ones.

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Duration;

use icongate_core::{CacheKey, SearchPayload};
use tokio::time::Instant;

use super::traits::{CacheLookup, CacheStats};

/// Cache of upstream search results keyed by `"{query}-{limit}"`.
pub type SearchCache = BoundedCache<CacheKey, SearchPayload>;

/// Stale queue records tolerated before a compaction pass.
const COMPACTION_SLACK: usize = 64;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    created_at: Instant,
    seq: u64,
}

/// A key/value store bounded by both age and count.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
    order: VecDeque<(u64, K)>,
    next_seq: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    sweeps: u64,
    entries_swept: u64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache. A zero capacity is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ttl,
            entries: HashMap::with_capacity(capacity.min(4096)),
            order: VecDeque::new(),
            next_seq: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
            sweeps: 0,
            entries_swept: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries held, including expired entries not yet removed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a key. An entry whose age has reached the TTL is removed and
    /// reported as a miss.
    pub fn get<Q>(&mut self, key: &Q) -> CacheLookup<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let age = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return CacheLookup::Miss;
            }
            Some(entry) => now.saturating_duration_since(entry.created_at),
        };

        if age >= self.ttl {
            self.entries.remove(key);
            self.expirations += 1;
            self.misses += 1;
            self.maybe_compact();
            return CacheLookup::Miss;
        }

        self.hits += 1;
        match self.entries.get(key) {
            Some(entry) => CacheLookup::Hit {
                value: entry.value.clone(),
                age,
            },
            None => CacheLookup::Miss,
        }
    }

    /// Whether a live (unexpired) entry exists, without touching counters.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.created_at.elapsed() < self.ttl)
    }

    /// Insert or overwrite. A new key at capacity evicts the oldest-inserted
    /// entry first; an overwrite takes the newest position and restarts the
    /// entry's TTL without evicting anything.
    pub fn put(&mut self, key: K, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, key.clone()));
        self.entries.insert(
            key,
            Entry {
                value,
                created_at: Instant::now(),
                seq,
            },
        );
        self.maybe_compact();
    }

    /// Remove a single entry, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let removed = self.entries.remove(key).map(|entry| entry.value);
        if removed.is_some() {
            self.maybe_compact();
        }
        removed
    }

    /// Remove every entry whose age has reached the TTL and return how many
    /// were removed.
    pub fn sweep_expired(&mut self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
        let removed = before - self.entries.len();

        self.sweeps += 1;
        self.entries_swept += removed as u64;
        if removed > 0 {
            self.compact();
        }
        removed
    }

    /// Remove everything and return the number of entries dropped.
    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        self.order.clear();
        cleared
    }

    /// Keys of unexpired entries in insertion order, oldest first. Entries
    /// past their TTL are left out even before a sweep removes them; `len`
    /// and `stats().entries` still count those until then.
    pub fn keys(&self) -> Vec<K> {
        let now = Instant::now();
        self.order
            .iter()
            .filter(|(seq, key)| self.is_live_record(*seq, key))
            .filter(|(_, key)| {
                self.entries
                    .get(key)
                    .is_some_and(|entry| now.saturating_duration_since(entry.created_at) < self.ttl)
            })
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            evictions: self.evictions,
            expirations: self.expirations,
            sweeps: self.sweeps,
            entries_swept: self.entries_swept,
        }
    }

    /// Zero the hit/miss/eviction/sweep counters. Entries are untouched.
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.expirations = 0;
        self.sweeps = 0;
        self.entries_swept = 0;
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn is_live_record(&self, seq: u64, key: &K) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.seq == seq)
    }

    fn evict_oldest(&mut self) {
        while let Some((seq, key)) = self.order.pop_front() {
            if self.is_live_record(seq, &key) {
                self.entries.remove(&key);
                self.evictions += 1;
                return;
            }
        }
    }

    fn maybe_compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + COMPACTION_SLACK {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(seq, key)| entries.get(key).is_some_and(|entry| entry.seq == *seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    const TTL: Duration = Duration::from_secs(300);

    fn cache(capacity: usize) -> BoundedCache<String, u32> {
        BoundedCache::new(capacity, TTL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_put_within_ttl() {
        let mut cache = cache(10);
        cache.put("home-10".to_string(), 1);
        advance(Duration::from_secs(299)).await;

        match cache.get("home-10") {
            CacheLookup::Hit { value, age } => {
                assert_eq!(value, 1);
                assert_eq!(age, Duration::from_secs(299));
            }
            CacheLookup::Miss => panic!("expected hit"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_misses_at_ttl_without_sweep() {
        let mut cache = cache(10);
        cache.put("home-10".to_string(), 1);
        advance(TTL).await;

        assert_eq!(cache.get("home-10"), CacheLookup::Miss);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_skip_expired_before_sweep() {
        let mut cache = cache(10);
        cache.put("old-10".to_string(), 1);
        advance(Duration::from_secs(200)).await;
        cache.put("new-10".to_string(), 2);
        advance(Duration::from_secs(100)).await;

        assert_eq!(cache.keys(), vec!["new-10".to_string()]);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.keys(), vec!["new-10".to_string()]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_absent_is_miss() {
        let mut cache = cache(10);
        assert_eq!(cache.get("nothing"), CacheLookup::Miss);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().expirations, 0);
    }

    #[test]
    fn test_fifo_eviction_ignores_reads() {
        let mut cache = cache(3);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("c".to_string(), 3);

        // Reading "a" does not protect it: eviction is by insertion order.
        assert!(cache.get("a").is_hit());
        cache.put("d".to_string(), 4);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.keys(), vec!["b", "c", "d"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_moves_to_newest_without_eviction() {
        let mut cache = cache(3);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.put("c".to_string(), 3);

        cache.put("a".to_string(), 10);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.keys(), vec!["b", "c", "a"]);

        cache.put("d".to_string(), 4);
        assert_eq!(cache.keys(), vec!["c", "a", "d"]);
        assert_eq!(cache.get("a").into_value(), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_ttl() {
        let mut cache = cache(3);
        cache.put("a".to_string(), 1);
        advance(Duration::from_secs(200)).await;
        cache.put("a".to_string(), 2);
        advance(Duration::from_secs(200)).await;

        assert_eq!(cache.get("a").into_value(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_exactly_expired() {
        let mut cache = cache(10);
        cache.put("old-1".to_string(), 1);
        cache.put("old-2".to_string(), 2);
        advance(Duration::from_secs(200)).await;
        cache.put("new-1".to_string(), 3);
        advance(Duration::from_secs(100)).await;

        assert_eq!(cache.sweep_expired(), 2);
        assert_eq!(cache.keys(), vec!["new-1"]);

        let stats = cache.stats();
        assert_eq!(stats.sweeps, 1);
        assert_eq!(stats.entries_swept, 2);
    }

    #[test]
    fn test_sweep_with_nothing_expired() {
        let mut cache = cache(10);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.sweep_expired(), 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().sweeps, 1);
    }

    #[test]
    fn test_clear_returns_prior_size() {
        let mut cache = cache(10);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);

        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
        assert_eq!(cache.clear(), 0);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = cache(0);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.capacity(), 1);
        assert_eq!(cache.keys(), vec!["b"]);
    }

    #[test]
    fn test_stale_records_are_compacted() {
        let mut cache = cache(2);
        for i in 0..1_000u32 {
            cache.put("same".to_string(), i);
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.order.len() <= 2 * 2 + COMPACTION_SLACK + 1);
        assert_eq!(cache.get("same").into_value(), Some(999));
    }

    #[test]
    fn test_remove_then_evict_skips_stale_record() {
        let mut cache = cache(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.remove("a"), Some(1));

        cache.put("c".to_string(), 3);
        assert_eq!(cache.stats().evictions, 0);
        cache.put("d".to_string(), 4);
        assert_eq!(cache.keys(), vec!["c", "d"]);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_reset_stats_keeps_entries() {
        let mut cache = cache(2);
        cache.put("a".to_string(), 1);
        let _ = cache.get("a");
        let _ = cache.get("b");
        cache.reset_stats();

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_search_cache_keys() {
        let mut cache = SearchCache::new(4, TTL);
        let key = CacheKey::new("home", 10);
        cache.put(key.clone(), SearchPayload::default());
        assert!(cache.contains(&key));
        assert_eq!(cache.keys(), vec![key]);
    }
}
