//! Health Check Endpoint
//!
//! `GET /health` reports the upstream session state, the request counters
//! and the current queue and cache depth. It reads state only: the session
//! is not probed here, the keep-alive job does that.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::session::ResourceState;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Overall status implied by the session state.
    pub fn from_session(state: ResourceState) -> Self {
        match state {
            ResourceState::Ready => Self::Healthy,
            ResourceState::Uninitialized | ResourceState::Degraded => Self::Degraded,
            ResourceState::Closed => Self::Unhealthy,
        }
    }
}

/// Counters and depths reported alongside the status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub active_requests: u64,
    pub errors: u64,
    /// Searches waiting for admission
    pub queue_size: usize,
    /// Searches currently admitted
    pub queue_pending: usize,
    pub cache_size: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub session: String,
    pub stats: HealthStats,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health - Liveness summary
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.handle.state();
    let status = HealthStatus::from_session(session);
    let counters = state.search.stats();

    let response = HealthResponse {
        status,
        session: session.as_str().to_string(),
        stats: HealthStats {
            total_requests: counters.total_requests,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            active_requests: counters.active_requests,
            errors: counters.errors,
            queue_size: state.queue.pending(),
            queue_pending: state.queue.in_flight(),
            cache_size: state.search.cache_len(),
        },
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    };

    let status_code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
