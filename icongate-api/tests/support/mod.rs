//! Shared builders for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use icongate_api::{create_api_router, ApiConfig, AppState};
use icongate_test_utils::{RecordingRestartSignal, ScriptedSampler, StubSessionFactory};
use serde_json::Value;
use tower::ServiceExt;

/// Ceiling used by every test state: 1 MiB.
pub const TEST_CEILING: u64 = 1024 * 1024;

pub fn test_config() -> ApiConfig {
    let mut config = ApiConfig::default();
    config.max_concurrent = 2;
    config.max_cache_size = 16;
    config.cache_ttl = Duration::from_secs(300);
    config.memory_ceiling = icongate_core::ByteSize(TEST_CEILING);
    config
}

/// State wired to a stub session and a scripted sampler at 10% of the
/// ceiling.
pub fn test_state(factory: &StubSessionFactory) -> AppState {
    test_state_with(factory, test_config(), Arc::new(ScriptedSampler::new(TEST_CEILING / 10)))
}

pub fn test_state_with(
    factory: &StubSessionFactory,
    config: ApiConfig,
    sampler: Arc<ScriptedSampler>,
) -> AppState {
    AppState::new(
        config,
        Arc::new(factory.clone()),
        sampler,
        Arc::new(RecordingRestartSignal::new()),
    )
}

pub fn test_router(state: &AppState) -> Router {
    create_api_router(state.clone())
}

/// Send one request and return the status with the JSON body.
pub async fn send(router: &Router, method: Method, uri: &str) -> Result<(StatusCode, Value), String> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .map_err(|e| e.to_string())?;

    let response = router
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| format!("Request failed: {:?}", e))?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("Failed to read body: {:?}", e))?;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| format!("Invalid JSON body: {}", e))?
    };
    Ok((status, json))
}

pub async fn get(router: &Router, uri: &str) -> Result<(StatusCode, Value), String> {
    send(router, Method::GET, uri).await
}

pub async fn delete(router: &Router, uri: &str) -> Result<(StatusCode, Value), String> {
    send(router, Method::DELETE, uri).await
}
