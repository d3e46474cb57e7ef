//! Search orchestration.
//!
//! A search is answered from the cache when a fresh entry exists. Otherwise
//! it is queued for admission, and once admitted it borrows the shared
//! session, fetches, and stores the payload before returning it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use icongate_core::{GatewayError, GatewayResult, SearchPayload, SearchQuery};
use icongate_storage::{CacheLookup, CacheStats, SearchCache};
use serde::Serialize;

use crate::queue::AdmissionQueue;
use crate::session::ResourceHandle;
use crate::telemetry::with_metrics;

/// Cache shared between the service, the sweep job and the routes.
pub type SharedCache = Arc<Mutex<SearchCache>>;

/// Lock the cache, recovering from poisoning. Never hold across an await.
pub fn lock_cache(cache: &SharedCache) -> MutexGuard<'_, SearchCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// STATS
// ============================================================================

/// Process-wide request counters.
#[derive(Debug, Default)]
pub struct SearchStats {
    pub total_requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Misses whose task has not settled yet.
    pub active_requests: AtomicU64,
    pub errors: AtomicU64,
}

impl SearchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        StatsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            active_requests: self.active_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                cache_hits as f64 / lookups as f64
            },
        }
    }

    /// Zero the monotonic counters. `active_requests` tracks live work and
    /// is left alone.
    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of [`SearchStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_requests: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Holds one unit of `active_requests` until dropped.
struct ActiveRequest {
    stats: Arc<SearchStats>,
}

impl ActiveRequest {
    fn begin(stats: Arc<SearchStats>) -> Self {
        stats.active_requests.fetch_add(1, Ordering::Relaxed);
        Self { stats }
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.stats.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of a successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub query: SearchQuery,
    pub payload: SearchPayload,
    /// Whether the payload came from the cache.
    pub cached: bool,
    /// Age of the cached entry; `None` for a fresh fetch.
    pub age: Option<Duration>,
}

/// Cache contents for introspection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub keys: Vec<String>,
    pub stats: CacheStats,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Cache-then-queue search front.
#[derive(Clone)]
pub struct SearchService {
    cache: SharedCache,
    queue: AdmissionQueue,
    handle: Arc<ResourceHandle>,
    stats: Arc<SearchStats>,
}

impl SearchService {
    pub fn new(cache: SharedCache, queue: AdmissionQueue, handle: Arc<ResourceHandle>) -> Self {
        Self {
            cache,
            queue,
            handle,
            stats: Arc::new(SearchStats::new()),
        }
    }

    /// Validate raw request parameters, then search.
    ///
    /// Invalid input is rejected before any counter moves.
    pub async fn search_params(
        &self,
        query: Option<&str>,
        limit: Option<&str>,
    ) -> GatewayResult<SearchOutcome> {
        let query = SearchQuery::parse(query, limit)?;
        self.search(query).await
    }

    /// Answer `query` from the cache or the upstream session.
    pub async fn search(&self, query: SearchQuery) -> GatewayResult<SearchOutcome> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let key = query.cache_key();

        let lookup = lock_cache(&self.cache).get(&key);
        if let CacheLookup::Hit { value, age } = lookup {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            with_metrics(|m| m.record_cache_lookup(true));
            tracing::debug!(key = %key, age_ms = age.as_millis() as u64, "Cache hit");
            return Ok(SearchOutcome {
                query,
                payload: value,
                cached: true,
                age: Some(age),
            });
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
        with_metrics(|m| m.record_cache_lookup(false));
        tracing::debug!(key = %key, "Cache miss, queueing fetch");

        let active = ActiveRequest::begin(Arc::clone(&self.stats));
        let handle = Arc::clone(&self.handle);
        let cache = Arc::clone(&self.cache);
        let stats = Arc::clone(&self.stats);
        let task_query = query.clone();

        let result = self
            .queue
            .submit(move || async move {
                let _active = active;
                let started = Instant::now();
                let result = fetch_and_store(&handle, &cache, &task_query).await;
                let elapsed = started.elapsed();
                with_metrics(|m| m.record_upstream_fetch(result.is_ok(), elapsed.as_secs_f64()));

                match &result {
                    Ok(payload) => tracing::info!(
                        key = %task_query.cache_key(),
                        items = payload.item_count(),
                        total = payload.total,
                        duration_ms = elapsed.as_millis() as u64,
                        "Search fetched"
                    ),
                    Err(e) => {
                        stats.errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            key = %task_query.cache_key(),
                            error = %e,
                            duration_ms = elapsed.as_millis() as u64,
                            "Search failed"
                        );
                    }
                }
                result
            })
            .await;

        // Failures inside the task were counted there.
        if let Err(e @ (GatewayError::QueueClosed | GatewayError::TaskAborted { .. })) = &result {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(key = %key, error = %e, "Search did not complete");
        }

        result.map(|payload| SearchOutcome {
            query,
            payload,
            cached: false,
            age: None,
        })
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Reset the request counters and the cache's own counters.
    pub fn reset_stats(&self) {
        self.stats.reset();
        lock_cache(&self.cache).reset_stats();
        tracing::info!("Statistics reset");
    }

    pub fn cache_len(&self) -> usize {
        lock_cache(&self.cache).len()
    }

    pub fn cache_snapshot(&self) -> CacheSnapshot {
        let cache = lock_cache(&self.cache);
        CacheSnapshot {
            keys: cache.keys().into_iter().map(String::from).collect(),
            stats: cache.stats(),
        }
    }

    /// Drop every cached entry, returning how many there were.
    pub fn clear_cache(&self) -> usize {
        let cleared = lock_cache(&self.cache).clear();
        with_metrics(|m| m.set_cache_entries(0));
        tracing::info!(cleared, "Cache cleared");
        cleared
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub fn handle(&self) -> &Arc<ResourceHandle> {
        &self.handle
    }
}

async fn fetch_and_store(
    handle: &ResourceHandle,
    cache: &SharedCache,
    query: &SearchQuery,
) -> GatewayResult<SearchPayload> {
    let lease = handle.acquire().await?;
    let raw = lease.fetch(query).await?;
    let payload = SearchPayload::from_json(raw)?;
    lock_cache(cache).put(query.cache_key(), payload.clone());
    Ok(payload)
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("queue", &self.queue)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
