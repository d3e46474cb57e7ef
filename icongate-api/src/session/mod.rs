//! Shared remote session: lifecycle ownership and the HTTP implementation.

pub mod handle;
pub mod http;

pub use handle::{
    HandleMetrics, HandleSnapshot, ProbeOutcome, ResourceHandle, ResourceState, SessionLease,
};
pub use http::{HttpSession, HttpSessionConfig, HttpSessionFactory};
