//! Background Jobs for icongate API
//!
//! Periodic tasks that run independently of traffic:
//!
//! - `cache_sweep`: drops expired cache entries
//! - `keep_alive`: probes the upstream session and respawns it when dead
//! - `memory_watch`: samples process memory and applies the pressure policy
//!
//! # Usage
//!
//! ```ignore
//! use icongate_api::jobs::BackgroundJobs;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let jobs = BackgroundJobs::spawn(&state, shutdown_rx);
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! jobs.join().await;
//! ```

pub mod cache_sweep;
pub mod keep_alive;
pub mod memory_watch;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::state::AppState;

pub use cache_sweep::{cache_sweep_task, CacheSweepConfig, CacheSweepMetrics, CacheSweepSnapshot};
pub use keep_alive::{keep_alive_task, KeepAliveConfig, KeepAliveMetrics, KeepAliveSnapshot};
pub use memory_watch::{
    memory_watch_task, MemoryWatchConfig, MemoryWatchMetrics, MemoryWatchSnapshot,
};

/// Join handles of the running background tasks.
pub struct BackgroundJobs {
    cache_sweep: JoinHandle<Arc<CacheSweepMetrics>>,
    keep_alive: JoinHandle<Arc<KeepAliveMetrics>>,
    memory_watch: JoinHandle<Arc<MemoryWatchMetrics>>,
}

impl BackgroundJobs {
    /// Spawn every job against `state`, all stopping on the same signal.
    pub fn spawn(state: &AppState, shutdown_rx: watch::Receiver<bool>) -> Self {
        let config = &state.config;
        Self {
            cache_sweep: tokio::spawn(cache_sweep_task(
                Arc::clone(state.search.cache()),
                CacheSweepConfig::from_api_config(config),
                shutdown_rx.clone(),
            )),
            keep_alive: tokio::spawn(keep_alive_task(
                Arc::clone(&state.handle),
                KeepAliveConfig::from_api_config(config),
                shutdown_rx.clone(),
            )),
            memory_watch: tokio::spawn(memory_watch_task(
                Arc::clone(&state.monitor),
                MemoryWatchConfig::from_api_config(config),
                shutdown_rx,
            )),
        }
    }

    /// Wait for every job to finish. A job that panicked is logged.
    pub async fn join(self) {
        if let Err(e) = self.cache_sweep.await {
            tracing::error!(error = %e, job = "cache_sweep", "Background job failed");
        }
        if let Err(e) = self.keep_alive.await {
            tracing::error!(error = %e, job = "keep_alive", "Background job failed");
        }
        if let Err(e) = self.memory_watch.await {
            tracing::error!(error = %e, job = "memory_watch", "Background job failed");
        }
    }
}
