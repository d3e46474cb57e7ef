//! Session Keep-Alive Background Task
//!
//! Probes the shared session on a fixed period, whether or not searches are
//! arriving. A dead session is replaced immediately so the next search does
//! not pay for creation. Failures are logged and counted, never fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ApiConfig;
use crate::constants::DEFAULT_KEEP_ALIVE_INTERVAL_SECS;
use crate::session::{ProbeOutcome, ResourceHandle};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the keep-alive task.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// How often to probe (default: 2 minutes)
    pub interval: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_KEEP_ALIVE_INTERVAL_SECS),
        }
    }
}

impl KeepAliveConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            interval: config.keep_alive_interval,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for keep-alive activity.
#[derive(Debug, Default)]
pub struct KeepAliveMetrics {
    /// Probes that found the session alive
    pub probes_alive: AtomicU64,

    /// Probes that found no session or a dead one
    pub probes_dead: AtomicU64,

    /// Sessions recreated after a dead probe
    pub respawns: AtomicU64,

    /// Recreation attempts that failed
    pub respawn_failures: AtomicU64,
}

impl KeepAliveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> KeepAliveSnapshot {
        KeepAliveSnapshot {
            probes_alive: self.probes_alive.load(Ordering::Relaxed),
            probes_dead: self.probes_dead.load(Ordering::Relaxed),
            respawns: self.respawns.load(Ordering::Relaxed),
            respawn_failures: self.respawn_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of keep-alive metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAliveSnapshot {
    pub probes_alive: u64,
    pub probes_dead: u64,
    pub respawns: u64,
    pub respawn_failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Probe the session every `config.interval` until shutdown is signalled.
///
/// The first probe happens one full interval after start; startup warm-up
/// has just created the session.
pub async fn keep_alive_task(
    handle: Arc<ResourceHandle>,
    config: KeepAliveConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<KeepAliveMetrics> {
    let metrics = Arc::new(KeepAliveMetrics::new());

    let mut probe_interval = interval_at(Instant::now() + config.interval, config.interval);
    probe_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Keep-alive task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Keep-alive task shutting down");
                    break;
                }
            }

            _ = probe_interval.tick() => {
                if handle.is_closed().await {
                    tracing::debug!("Session handle closed, skipping keep-alive");
                    continue;
                }
                keep_alive_once(&handle, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        probes_alive = snapshot.probes_alive,
        probes_dead = snapshot.probes_dead,
        respawns = snapshot.respawns,
        respawn_failures = snapshot.respawn_failures,
        "Keep-alive task completed"
    );

    metrics
}

/// One probe, plus an eager respawn if the session is gone.
async fn keep_alive_once(handle: &ResourceHandle, metrics: &KeepAliveMetrics) {
    match handle.probe().await {
        ProbeOutcome::Alive => {
            metrics.probes_alive.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Keep-alive probe succeeded");
        }
        ProbeOutcome::Dead => {
            metrics.probes_dead.fetch_add(1, Ordering::Relaxed);
            match handle.acquire().await {
                Ok(lease) => {
                    metrics.respawns.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(generation = lease.generation(), "Keep-alive respawned session");
                }
                Err(e) => {
                    metrics.respawn_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "Keep-alive could not respawn session");
                }
            }
        }
    }
}
