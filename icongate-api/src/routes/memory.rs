//! Memory Health Endpoint
//!
//! `GET /memory-health` takes a fresh reading and reports it with the
//! pressure level and the advisory per-entry estimates. Reading memory here
//! never triggers the restart policy; only the memory watch job does.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use icongate_core::{MemoryDiagnostics, MemoryPressure, MemoryReading, MemoryThresholds};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::monitor::MonitorSnapshot;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct MemoryHealthResponse {
    pub status: MemoryPressure,
    pub reading: MemoryReading,
    pub diagnostics: MemoryDiagnostics,
    pub thresholds: MemoryThresholds,
    pub monitor: MonitorSnapshot,
    pub timestamp: String,
}

/// GET /memory-health - Current reading, pressure level and diagnostics
pub async fn memory_health(State(state): State<AppState>) -> ApiResult<Json<MemoryHealthResponse>> {
    let entries = state.search.cache_len();
    let (reading, diagnostics) = state
        .monitor
        .diagnostics(entries)
        .ok_or_else(|| ApiError::service_unavailable("Resident memory is not available"))?;

    Ok(Json(MemoryHealthResponse {
        status: diagnostics.pressure,
        reading,
        diagnostics,
        thresholds: *state.monitor.thresholds(),
        monitor: state.monitor.metrics(),
        timestamp: Utc::now().to_rfc3339(),
    }))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/memory-health", get(memory_health))
}
