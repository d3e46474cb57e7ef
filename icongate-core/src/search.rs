//! Search request and payload types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{UpstreamError, ValidationError};

// ============================================================================
// LIMITS
// ============================================================================

/// Limit used when the caller does not send one.
pub const DEFAULT_SEARCH_LIMIT: u32 = 999;

/// Smallest accepted limit.
pub const MIN_SEARCH_LIMIT: u32 = 1;

/// Largest limit the remote search endpoint honours.
pub const MAX_SEARCH_LIMIT: u32 = 999;

// ============================================================================
// SEARCH QUERY
// ============================================================================

/// A validated search request.
///
/// Construction is the only validation point: once a `SearchQuery` exists the
/// query is non-blank and the limit is within range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    query: String,
    limit: u32,
}

impl SearchQuery {
    /// Validate and build a search query. A missing limit means
    /// [`DEFAULT_SEARCH_LIMIT`].
    pub fn new(query: impl Into<String>, limit: Option<u32>) -> Result<Self, ValidationError> {
        let query = query.into().trim().to_string();
        if query.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "query".to_string(),
            });
        }

        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if !(MIN_SEARCH_LIMIT..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(ValidationError::OutOfRange {
                field: "limit".to_string(),
                value: limit.to_string(),
                min: u64::from(MIN_SEARCH_LIMIT),
                max: u64::from(MAX_SEARCH_LIMIT),
            });
        }

        Ok(Self { query, limit })
    }

    /// Parse the raw `limit` query-string value before validating.
    pub fn parse(query: Option<&str>, limit: Option<&str>) -> Result<Self, ValidationError> {
        let query = query.ok_or_else(|| ValidationError::RequiredFieldMissing {
            field: "query".to_string(),
        })?;

        let limit = match limit.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| ValidationError::InvalidFormat {
                field: "limit".to_string(),
                reason: format!("expected a positive integer, got '{}'", raw),
            })?),
            None => None,
        };

        Self::new(query, limit)
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Cache identity of this request.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.query, self.limit)
    }
}

// ============================================================================
// CACHE KEY
// ============================================================================

/// Deterministic cache identity of a `(query, limit)` pair, rendered as
/// `"{query}-{limit}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(query: &str, limit: u32) -> Self {
        Self(format!("{}-{}", query, limit))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

// ============================================================================
// SEARCH PAYLOAD
// ============================================================================

/// Successful response from the remote search endpoint.
///
/// The endpoint names the result list `icons`; stubs and older payloads use
/// `items`. Both deserialize into [`SearchPayload::items`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchPayload {
    #[serde(default)]
    pub total: u64,

    #[serde(default, alias = "icons")]
    pub items: Vec<Value>,

    #[serde(default)]
    pub collections: Map<String, Value>,
}

impl SearchPayload {
    /// Interpret a raw JSON document returned by the remote session.
    ///
    /// A document carrying an `error` field is an upstream failure even when
    /// the transport succeeded.
    pub fn from_json(value: Value) -> Result<Self, UpstreamError> {
        let Value::Object(object) = value else {
            return Err(UpstreamError::MalformedPayload {
                reason: "expected a JSON object".to_string(),
            });
        };

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Err(UpstreamError::Reported { message });
        }

        serde_json::from_value(Value::Object(object)).map_err(|e| UpstreamError::MalformedPayload {
            reason: e.to_string(),
        })
    }

    /// Number of result items actually carried by the payload.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_format() {
        let query = SearchQuery::new("home", Some(10)).unwrap();
        assert_eq!(query.cache_key().as_str(), "home-10");
    }

    #[test]
    fn test_default_limit() {
        let query = SearchQuery::new("pizza", None).unwrap();
        assert_eq!(query.limit(), DEFAULT_SEARCH_LIMIT);
        assert_eq!(query.cache_key().to_string(), "pizza-999");
    }

    #[test]
    fn test_blank_query_rejected() {
        let err = SearchQuery::new("   ", Some(10)).unwrap_err();
        assert!(matches!(err, ValidationError::RequiredFieldMissing { .. }));
    }

    #[test]
    fn test_limit_out_of_range() {
        assert!(matches!(
            SearchQuery::new("home", Some(0)),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            SearchQuery::new("home", Some(MAX_SEARCH_LIMIT + 1)),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_missing_query() {
        let err = SearchQuery::parse(None, Some("10")).unwrap_err();
        assert_eq!(
            err,
            ValidationError::RequiredFieldMissing {
                field: "query".to_string()
            }
        );
    }

    #[test]
    fn test_parse_non_numeric_limit() {
        let err = SearchQuery::parse(Some("home"), Some("ten")).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_parse_empty_limit_uses_default() {
        let query = SearchQuery::parse(Some("home"), Some("")).unwrap();
        assert_eq!(query.limit(), DEFAULT_SEARCH_LIMIT);
    }

    #[test]
    fn test_payload_accepts_icons_alias() {
        let payload = SearchPayload::from_json(json!({
            "total": 2,
            "icons": ["mdi:home", "mdi:house"],
            "collections": {"mdi": {"name": "Material Design Icons"}}
        }))
        .unwrap();
        assert_eq!(payload.total, 2);
        assert_eq!(payload.item_count(), 2);
        assert!(payload.collections.contains_key("mdi"));
    }

    #[test]
    fn test_payload_accepts_items() {
        let payload = SearchPayload::from_json(json!({
            "total": 1,
            "items": [{"name": "home"}]
        }))
        .unwrap();
        assert_eq!(payload.items, vec![json!({"name": "home"})]);
        assert!(payload.collections.is_empty());
    }

    #[test]
    fn test_payload_reported_error() {
        let err = SearchPayload::from_json(json!({"error": "HTTP 500: Internal"})).unwrap_err();
        assert_eq!(
            err,
            UpstreamError::Reported {
                message: "HTTP 500: Internal".to_string()
            }
        );
    }

    #[test]
    fn test_payload_not_an_object() {
        let err = SearchPayload::from_json(json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedPayload { .. }));
    }

    #[test]
    fn test_payload_wrong_field_type() {
        let err = SearchPayload::from_json(json!({"total": "many"})).unwrap_err();
        assert!(matches!(err, UpstreamError::MalformedPayload { .. }));
    }
}
