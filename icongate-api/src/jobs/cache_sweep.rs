//! Cache Sweep Background Task
//!
//! Expired entries are already invisible to readers, but they keep their
//! memory until something removes them. This task walks the cache on a
//! fixed period and drops every entry past its TTL, independent of traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ApiConfig;
use crate::constants::DEFAULT_CACHE_SWEEP_INTERVAL_SECS;
use crate::services::{lock_cache, SharedCache};
use crate::telemetry::with_metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cache sweep task.
#[derive(Debug, Clone)]
pub struct CacheSweepConfig {
    /// How often to sweep (default: 60 seconds)
    pub interval: Duration,
}

impl Default for CacheSweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        }
    }
}

impl CacheSweepConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            interval: config.cache_sweep_interval,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity.
#[derive(Debug, Default)]
pub struct CacheSweepMetrics {
    /// Sweep passes completed
    pub sweeps: AtomicU64,

    /// Entries removed across all passes
    pub entries_removed: AtomicU64,
}

impl CacheSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheSweepSnapshot {
        CacheSweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            entries_removed: self.entries_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSweepSnapshot {
    pub sweeps: u64,
    pub entries_removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Periodically remove expired cache entries until shutdown is signalled.
pub async fn cache_sweep_task(
    cache: SharedCache,
    config: CacheSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweepMetrics> {
    let metrics = Arc::new(CacheSweepMetrics::new());

    let mut sweep_interval = interval(config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&cache, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        entries_removed = snapshot.entries_removed,
        "Cache sweep task completed"
    );

    metrics
}

/// One sweep pass.
fn sweep_once(cache: &SharedCache, metrics: &CacheSweepMetrics) {
    let (removed, remaining) = {
        let mut cache = lock_cache(cache);
        let removed = cache.sweep_expired();
        (removed, cache.len())
    };

    metrics.sweeps.fetch_add(1, Ordering::Relaxed);
    metrics
        .entries_removed
        .fetch_add(removed as u64, Ordering::Relaxed);
    with_metrics(|m| m.set_cache_entries(remaining));

    if removed > 0 {
        tracing::info!(removed, remaining, "Expired cache entries swept");
    } else {
        tracing::trace!(remaining, "Cache sweep found nothing expired");
    }
}
