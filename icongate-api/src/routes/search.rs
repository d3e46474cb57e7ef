//! Icon Search Endpoint
//!
//! `GET /search?query=&limit=`: answered from the cache when fresh,
//! otherwise fetched through the admission queue.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::services::SearchService;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Raw query-string parameters. Validation happens in the service so the
/// rejection carries the gateway's error shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub limit: Option<String>,
}

/// Successful search response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: String,
    pub query: String,
    pub total: u64,
    pub items: Vec<Value>,
    pub collections: Map<String, Value>,
    /// Whether the result was served from the cache.
    pub cached: bool,
    pub timestamp: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /search - Search the icon catalog
pub async fn search_icons(
    State(search): State<Arc<SearchService>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let outcome = search
        .search_params(params.query.as_deref(), params.limit.as_deref())
        .await
        .map_err(|e| {
            let error = ApiError::from(e);
            match params.query.as_deref() {
                Some(query) => error.with_query(query),
                None => error,
            }
        })?;

    let payload = outcome.payload;
    Ok(Json(SearchResponse {
        status: "success".to_string(),
        query: outcome.query.query().to_string(),
        total: payload.total,
        items: payload.items,
        collections: payload.collections,
        cached: outcome.cached,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/search", get(search_icons))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_response_shape() {
        let response = SearchResponse {
            status: "success".to_string(),
            query: "home".to_string(),
            total: 1,
            items: vec![serde_json::json!({"name": "home"})],
            collections: Map::new(),
            cached: false,
            timestamp: Utc::now().to_rfc3339(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["items"][0]["name"], "home");
        assert_eq!(json["cached"], false);
        assert!(json["collections"].is_object());
    }

    #[test]
    fn test_params_default_empty() {
        let params: SearchParams = serde_json::from_str("{}").unwrap();
        assert!(params.query.is_none());
        assert!(params.limit.is_none());
    }
}
