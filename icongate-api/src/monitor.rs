//! Process memory monitoring.
//!
//! The monitor samples resident memory, classifies it against the ceiling,
//! and on `Critical` hands the reading to a [`RestartSignal`]. The signal
//! fires once per breach; it re-arms only after a sample below `Critical`.
//! No other remediation is attempted: the cache is not cleared and the
//! session is not recycled.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use icongate_core::{
    ByteSize, MemoryDiagnostics, MemoryPressure, MemoryReading, MemorySampler, MemoryThresholds,
    RestartSignal,
};
use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::constants::MEMORY_RESTART_EXIT_CODE;

// ============================================================================
// SAMPLER
// ============================================================================

/// Reads this process's resident set size through `sysinfo`.
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Pid,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from(std::process::id() as usize),
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn resident_bytes(&self) -> Option<u64> {
        let mut system = match self.system.lock() {
            Ok(system) => system,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        system.process(self.pid).map(|process| process.memory())
    }
}

// ============================================================================
// RESTART SIGNAL
// ============================================================================

/// Terminates the process so the supervisor restarts it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl RestartSignal for ExitProcess {
    fn trigger(&self, reading: &MemoryReading) {
        tracing::error!(
            resident_bytes = reading.resident_bytes,
            ceiling_bytes = reading.ceiling_bytes,
            percent = %format!("{:.1}", reading.percent_of_ceiling()),
            exit_code = MEMORY_RESTART_EXIT_CODE,
            "Memory ceiling reached, exiting for supervisor restart"
        );
        std::process::exit(MEMORY_RESTART_EXIT_CODE);
    }
}

// ============================================================================
// MONITOR
// ============================================================================

/// Counters for memory checks.
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    pub samples: AtomicU64,
    pub sample_failures: AtomicU64,
    pub warnings: AtomicU64,
    pub restarts_triggered: AtomicU64,
}

/// Point-in-time view of the monitor counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorSnapshot {
    pub samples: u64,
    pub sample_failures: u64,
    pub warnings: u64,
    pub restarts_triggered: u64,
}

/// One classified memory sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCheck {
    pub reading: MemoryReading,
    pub pressure: MemoryPressure,
    /// Whether this check fired the restart signal.
    pub restart_triggered: bool,
}

/// Samples memory and applies the pressure policy.
pub struct HealthMonitor {
    sampler: Arc<dyn MemorySampler>,
    restart: Arc<dyn RestartSignal>,
    ceiling: ByteSize,
    thresholds: MemoryThresholds,
    critical_latched: AtomicBool,
    last_reading: Mutex<Option<MemoryReading>>,
    metrics: MonitorMetrics,
}

impl HealthMonitor {
    pub fn new(
        sampler: Arc<dyn MemorySampler>,
        restart: Arc<dyn RestartSignal>,
        ceiling: ByteSize,
    ) -> Self {
        Self {
            sampler,
            restart,
            ceiling,
            thresholds: MemoryThresholds::default(),
            critical_latched: AtomicBool::new(false),
            last_reading: Mutex::new(None),
            metrics: MonitorMetrics::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: MemoryThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn ceiling(&self) -> ByteSize {
        self.ceiling
    }

    pub fn thresholds(&self) -> &MemoryThresholds {
        &self.thresholds
    }

    /// Take a reading without applying the policy.
    pub fn sample(&self) -> Option<MemoryReading> {
        self.metrics.samples.fetch_add(1, Ordering::Relaxed);
        match self.sampler.resident_bytes() {
            Some(bytes) => {
                let reading = MemoryReading::new(bytes, self.ceiling.as_u64());
                self.store_last(reading.clone());
                Some(reading)
            }
            None => {
                self.metrics.sample_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Resident memory unavailable");
                None
            }
        }
    }

    /// Sample, classify and act on the result.
    pub fn check(&self) -> Option<MemoryCheck> {
        let reading = self.sample()?;
        let pressure = reading.pressure(&self.thresholds);
        let percent = format!("{:.1}", reading.percent_of_ceiling());

        let mut restart_triggered = false;
        match pressure {
            MemoryPressure::Healthy => {
                tracing::debug!(resident_bytes = reading.resident_bytes, %percent, "Memory healthy");
            }
            MemoryPressure::Moderate => {
                tracing::info!(resident_bytes = reading.resident_bytes, %percent, "Memory moderate");
            }
            MemoryPressure::Warning => {
                self.metrics.warnings.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    resident_bytes = reading.resident_bytes,
                    ceiling_bytes = reading.ceiling_bytes,
                    %percent,
                    "Memory approaching ceiling"
                );
            }
            MemoryPressure::Critical => {
                if !self.critical_latched.swap(true, Ordering::AcqRel) {
                    self.metrics.restarts_triggered.fetch_add(1, Ordering::Relaxed);
                    restart_triggered = true;
                    self.restart.trigger(&reading);
                } else {
                    tracing::debug!(%percent, "Memory still critical, restart already signalled");
                }
            }
        }

        if pressure < MemoryPressure::Critical {
            self.critical_latched.store(false, Ordering::Release);
        }

        Some(MemoryCheck {
            reading,
            pressure,
            restart_triggered,
        })
    }

    /// Most recent reading taken by `sample` or `check`.
    pub fn last_reading(&self) -> Option<MemoryReading> {
        match self.last_reading.lock() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fresh reading plus the advisory per-entry figures.
    pub fn diagnostics(&self, cache_entries: usize) -> Option<(MemoryReading, MemoryDiagnostics)> {
        let reading = self.sample()?;
        let diagnostics = MemoryDiagnostics::derive(&reading, &self.thresholds, cache_entries);
        Some((reading, diagnostics))
    }

    pub fn metrics(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            samples: self.metrics.samples.load(Ordering::Relaxed),
            sample_failures: self.metrics.sample_failures.load(Ordering::Relaxed),
            warnings: self.metrics.warnings.load(Ordering::Relaxed),
            restarts_triggered: self.metrics.restarts_triggered.load(Ordering::Relaxed),
        }
    }

    fn store_last(&self, reading: MemoryReading) {
        match self.last_reading.lock() {
            Ok(mut last) => *last = Some(reading),
            Err(poisoned) => *poisoned.into_inner() = Some(reading),
        }
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("ceiling", &self.ceiling)
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icongate_test_utils::{RecordingRestartSignal, ScriptedSampler};

    const CEILING: u64 = 1_000_000;

    fn monitor(sampler: &Arc<ScriptedSampler>, signal: &Arc<RecordingRestartSignal>) -> HealthMonitor {
        HealthMonitor::new(
            Arc::clone(sampler) as Arc<dyn MemorySampler>,
            Arc::clone(signal) as Arc<dyn RestartSignal>,
            ByteSize(CEILING),
        )
    }

    #[test]
    fn test_critical_fires_once_per_breach() {
        let sampler = Arc::new(ScriptedSampler::new(1_050_000));
        let signal = Arc::new(RecordingRestartSignal::new());
        let monitor = monitor(&sampler, &signal);

        let first = monitor.check().unwrap();
        assert_eq!(first.pressure, MemoryPressure::Critical);
        assert!(first.restart_triggered);

        let second = monitor.check().unwrap();
        assert!(!second.restart_triggered);
        assert_eq!(signal.count(), 1);
        assert_eq!(signal.readings()[0].resident_bytes, 1_050_000);
    }

    #[test]
    fn test_critical_rearms_after_recovery() {
        let sampler = Arc::new(ScriptedSampler::new(1_050_000));
        let signal = Arc::new(RecordingRestartSignal::new());
        let monitor = monitor(&sampler, &signal);

        monitor.check();
        sampler.set(900_000);
        assert_eq!(monitor.check().unwrap().pressure, MemoryPressure::Warning);
        sampler.set(1_200_000);
        assert!(monitor.check().unwrap().restart_triggered);
        assert_eq!(signal.count(), 2);
        assert_eq!(monitor.metrics().restarts_triggered, 2);
    }

    #[test]
    fn test_warning_does_not_trigger() {
        let sampler = Arc::new(ScriptedSampler::new(850_000));
        let signal = Arc::new(RecordingRestartSignal::new());
        let monitor = monitor(&sampler, &signal);

        let check = monitor.check().unwrap();
        assert_eq!(check.pressure, MemoryPressure::Warning);
        assert!(!check.restart_triggered);
        assert_eq!(signal.count(), 0);
        assert_eq!(monitor.metrics().warnings, 1);
    }

    #[test]
    fn test_unavailable_sample() {
        let sampler = Arc::new(ScriptedSampler::unavailable());
        let signal = Arc::new(RecordingRestartSignal::new());
        let monitor = monitor(&sampler, &signal);

        assert!(monitor.check().is_none());
        assert!(monitor.last_reading().is_none());
        assert_eq!(monitor.metrics().sample_failures, 1);
    }

    #[test]
    fn test_diagnostics_uses_fresh_sample() {
        let sampler = Arc::new(ScriptedSampler::new(500_000));
        let signal = Arc::new(RecordingRestartSignal::new());
        let monitor = monitor(&sampler, &signal);

        let (reading, diag) = monitor.diagnostics(100).unwrap();
        assert_eq!(reading.resident_bytes, 500_000);
        assert_eq!(diag.avg_bytes_per_entry, Some(5_000));
        assert_eq!(diag.estimated_remaining_entries, Some(100));
        assert_eq!(monitor.last_reading(), Some(reading));
    }

    #[test]
    fn test_process_sampler_reads_self() {
        let sampler = ProcessMemorySampler::new();
        let bytes = sampler.resident_bytes();
        assert!(bytes.is_some_and(|b| b > 0));
    }
}
