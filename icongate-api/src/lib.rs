//! icongate API - HTTP gateway for icon catalog searches
//!
//! Fronts one shared, expensive upstream session with a bounded TTL cache,
//! a FIFO admission queue capping concurrent upstream use, self-healing
//! session management and memory-pressure self-restart.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod monitor;
pub mod queue;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::{ApiConfig, ConfigSummary, LogFormat};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use jobs::BackgroundJobs;
pub use monitor::{ExitProcess, HealthMonitor, MemoryCheck, ProcessMemorySampler};
pub use queue::{AdmissionQueue, QueueSnapshot};
pub use routes::create_api_router;
pub use services::{SearchOutcome, SearchService, StatsSnapshot};
pub use session::{
    HttpSessionConfig, HttpSessionFactory, ProbeOutcome, ResourceHandle, ResourceState,
};
pub use state::AppState;
