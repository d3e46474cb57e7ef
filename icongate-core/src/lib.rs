//! icongate Core - Shared Types
//!
//! Error taxonomy, validated search types, the remote session boundary and
//! the memory pressure model. Every other icongate crate depends on this one;
//! it holds no runtime state of its own.

pub mod error;
pub mod memory;
pub mod search;
pub mod session;

pub use error::{
    ConfigError, GatewayError, GatewayResult, ResourceError, UpstreamError, ValidationError,
};
pub use memory::{
    ByteSize, MemoryDiagnostics, MemoryPressure, MemoryReading, MemorySampler, MemoryThresholds,
    RestartSignal,
};
pub use search::{
    CacheKey, SearchPayload, SearchQuery, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
    MIN_SEARCH_LIMIT,
};
pub use session::{RemoteSession, SessionFactory};
