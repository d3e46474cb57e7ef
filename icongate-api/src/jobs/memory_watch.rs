//! Memory Watch Background Task
//!
//! Drives [`HealthMonitor::check`] on a fixed period. The monitor owns the
//! policy (warning logs, the once-per-breach restart signal); this task only
//! schedules it and publishes the reading.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use icongate_core::MemoryPressure;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::ApiConfig;
use crate::constants::DEFAULT_MEMORY_CHECK_INTERVAL_SECS;
use crate::monitor::HealthMonitor;
use crate::telemetry::with_metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the memory watch task.
#[derive(Debug, Clone)]
pub struct MemoryWatchConfig {
    /// How often to sample (default: 30 seconds)
    pub interval: Duration,
}

impl Default for MemoryWatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_MEMORY_CHECK_INTERVAL_SECS),
        }
    }
}

impl MemoryWatchConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            interval: config.memory_check_interval,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for memory watch activity.
#[derive(Debug, Default)]
pub struct MemoryWatchMetrics {
    /// Checks that produced a reading
    pub checks: AtomicU64,

    /// Ticks where memory could not be read
    pub unavailable: AtomicU64,

    /// Checks at `Warning` or above
    pub elevated: AtomicU64,
}

impl MemoryWatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryWatchSnapshot {
        MemoryWatchSnapshot {
            checks: self.checks.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            elevated: self.elevated.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of memory watch metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryWatchSnapshot {
    pub checks: u64,
    pub unavailable: u64,
    pub elevated: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Check process memory every `config.interval` until shutdown is signalled.
pub async fn memory_watch_task(
    monitor: Arc<HealthMonitor>,
    config: MemoryWatchConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<MemoryWatchMetrics> {
    let metrics = Arc::new(MemoryWatchMetrics::new());

    let mut check_interval = interval(config.interval);
    check_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        ceiling_bytes = monitor.ceiling().as_u64(),
        "Memory watch task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Memory watch task shutting down");
                    break;
                }
            }

            _ = check_interval.tick() => {
                match monitor.check() {
                    Some(check) => {
                        metrics.checks.fetch_add(1, Ordering::Relaxed);
                        if check.pressure >= MemoryPressure::Warning {
                            metrics.elevated.fetch_add(1, Ordering::Relaxed);
                        }
                        with_metrics(|m| m.set_resident_memory(check.reading.resident_bytes));
                    }
                    None => {
                        metrics.unavailable.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        checks = snapshot.checks,
        unavailable = snapshot.unavailable,
        elevated = snapshot.elevated,
        "Memory watch task completed"
    );

    metrics
}
