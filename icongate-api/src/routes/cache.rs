//! Cache Introspection Endpoints
//!
//! `GET /cache-stats` lists the cached keys and the cache counters;
//! `DELETE /cache` empties the cache.

use std::sync::Arc;

use axum::{
    extract::State,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::services::SearchService;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub cache_size: usize,
    /// Keys in insertion order, oldest first
    pub cached_keys: Vec<String>,
    pub capacity: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub sweeps: u64,
    pub entries_swept: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub cleared_count: usize,
    pub timestamp: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /cache-stats - Cache contents and counters
pub async fn cache_stats(State(search): State<Arc<SearchService>>) -> Json<CacheStatsResponse> {
    let snapshot = search.cache_snapshot();
    let stats = snapshot.stats;

    Json(CacheStatsResponse {
        cache_size: snapshot.keys.len(),
        cached_keys: snapshot.keys,
        capacity: stats.capacity,
        ttl_secs: stats.ttl_secs,
        hits: stats.hits,
        misses: stats.misses,
        hit_rate: stats.hit_rate(),
        evictions: stats.evictions,
        expirations: stats.expirations,
        sweeps: stats.sweeps,
        entries_swept: stats.entries_swept,
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// DELETE /cache - Drop every cached entry
pub async fn clear_cache(State(search): State<Arc<SearchService>>) -> Json<ClearCacheResponse> {
    let cleared_count = search.clear_cache();
    Json(ClearCacheResponse {
        message: "Cache cleared".to_string(),
        cleared_count,
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/cache-stats", get(cache_stats))
        .route("/cache", delete(clear_cache))
}
