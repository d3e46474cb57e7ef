//! Remote session abstraction.
//!
//! The gateway fronts exactly one expensive, stateful session against the
//! remote icon catalog. How that session is driven is not the gateway's
//! concern: it only needs to create one, probe it, fetch through it and
//! close it. Implementations must be thread-safe (Send + Sync).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ResourceError, UpstreamError};
use crate::search::SearchQuery;

/// A live session against the remote catalog.
///
/// # Example
/// ```ignore
/// struct HeadlessPage { /* ... */ }
///
/// #[async_trait]
/// impl RemoteSession for HeadlessPage {
///     async fn probe(&self) -> Result<(), ResourceError> { /* evaluate a no-op */ }
///     async fn fetch(&self, query: &SearchQuery) -> Result<Value, UpstreamError> { /* ... */ }
///     async fn close(&self) { /* release the page */ }
/// }
/// ```
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Cheap no-op round-trip proving the session still works.
    async fn probe(&self) -> Result<(), ResourceError>;

    /// Run one search through the session and return the raw JSON document.
    async fn fetch(&self, query: &SearchQuery) -> Result<Value, UpstreamError>;

    /// Release the session. Must tolerate being called on a dead session.
    async fn close(&self);
}

/// Creates new remote sessions on demand.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Build and warm up a new session.
    async fn create(&self) -> Result<Box<dyn RemoteSession>, ResourceError>;

    /// Short human-readable description used in logs.
    fn describe(&self) -> String {
        "remote session".to_string()
    }
}
