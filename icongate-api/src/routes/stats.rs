//! Statistics Endpoints
//!
//! `GET /stats` returns every counter the service keeps, the current memory
//! reading and the effective configuration. `DELETE /stats` zeroes the
//! counters.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use icongate_core::MemoryReading;
use serde::Serialize;

use crate::config::ConfigSummary;
use crate::monitor::MonitorSnapshot;
use crate::queue::QueueSnapshot;
use crate::services::StatsSnapshot;
use crate::session::HandleSnapshot;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StatsBody {
    #[serde(flatten)]
    pub counters: StatsSnapshot,
    pub uptime_secs: f64,
    /// `None` when the platform does not report resident memory.
    pub memory: Option<MemoryReading>,
    /// Searches waiting for admission
    pub queue_size: usize,
    /// Searches currently admitted
    pub queue_pending: usize,
    pub cache_size: usize,
    pub cache_keys: Vec<String>,
    pub evictions: u64,
    pub sweeps: u64,
    pub entries_swept: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub stats: StatsBody,
    pub queue: QueueSnapshot,
    pub session: HandleSnapshot,
    pub monitor: MonitorSnapshot,
    pub config: ConfigSummary,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub message: String,
    pub timestamp: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /stats - Counters, memory, queue and cache state
pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.search.cache_snapshot();
    let queue = state.queue.snapshot();

    Json(StatsResponse {
        stats: StatsBody {
            counters: state.search.stats(),
            uptime_secs: state.uptime_secs(),
            memory: state.monitor.sample(),
            queue_size: queue.pending,
            queue_pending: queue.in_flight,
            cache_size: cache.keys.len(),
            cache_keys: cache.keys,
            evictions: cache.stats.evictions,
            sweeps: cache.stats.sweeps,
            entries_swept: cache.stats.entries_swept,
        },
        queue,
        session: state.handle.metrics(),
        monitor: state.monitor.metrics(),
        config: state.config.summary(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// DELETE /stats - Reset counters
pub async fn reset_stats(State(state): State<AppState>) -> Json<ResetResponse> {
    state.search.reset_stats();
    Json(ResetResponse {
        message: "Statistics reset".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats).delete(reset_stats))
}
