//! icongate Telemetry - Observability Infrastructure
//!
//! Structured logging through `tracing` and Prometheus metrics for the API
//! layer. Neither needs an external collector.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, with_metrics, GatewayMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{env_filter, init_tracing};
