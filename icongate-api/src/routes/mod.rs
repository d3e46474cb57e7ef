//! REST API Routes Module
//!
//! Includes:
//! - Icon search
//! - Statistics and cache introspection, with their reset/clear operations
//! - Memory health
//! - Health check and Prometheus metrics
//! - CORS support for browser-based clients
//!
//! Every `/api/...` route is also served without the prefix.

pub mod cache;
pub mod health;
pub mod memory;
pub mod search;
pub mod stats;

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware, with_metrics};

// Re-export route creation functions for convenience
pub use cache::create_router as cache_router;
pub use health::create_router as health_router;
pub use memory::create_router as memory_router;
pub use search::create_router as search_router;
pub use stats::create_router as stats_router;

// ============================================================================
// METRICS ENDPOINT
// ============================================================================

/// GET /metrics - Refresh the depth gauges, then render the registry.
async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let pending = state.queue.pending();
    let in_flight = state.queue.in_flight();
    let entries = state.search.cache_len();
    with_metrics(|m| {
        m.set_queue_depth(pending, in_flight);
        m.set_cache_entries(entries);
    });
    metrics_handler().await
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Routes served both under `/api` and at the root.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(search_router())
        .merge(stats_router())
        .merge(cache_router())
        .merge(memory_router())
}

/// Build the complete application router.
pub fn create_api_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .merge(health_router())
        .route("/metrics", get(metrics))
        .merge(api_routes())
        .nest("/api", api_routes())
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build CORS layer from configuration.
///
/// With no configured origins every origin is allowed.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.restricts_origins() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}
