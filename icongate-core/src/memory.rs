//! Memory pressure model.
//!
//! Readings are classified against a configured ceiling. The classification
//! drives logging and the critical self-restart; the derived diagnostics are
//! advisory only and never feed a control decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ============================================================================
// PRESSURE LEVELS
// ============================================================================

/// Memory pressure relative to the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryPressure {
    Healthy,
    Moderate,
    Warning,
    Critical,
}

impl MemoryPressure {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryPressure::Healthy => "healthy",
            MemoryPressure::Moderate => "moderate",
            MemoryPressure::Warning => "warning",
            MemoryPressure::Critical => "critical",
        }
    }
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ratios of the ceiling at which each pressure level begins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryThresholds {
    pub moderate: f64,
    pub warning: f64,
    pub critical: f64,
}

impl Default for MemoryThresholds {
    fn default() -> Self {
        Self {
            moderate: 0.60,
            warning: 0.80,
            critical: 1.00,
        }
    }
}

impl MemoryThresholds {
    /// Classify a usage ratio (resident / ceiling).
    pub fn classify(&self, ratio: f64) -> MemoryPressure {
        if ratio >= self.critical {
            MemoryPressure::Critical
        } else if ratio >= self.warning {
            MemoryPressure::Warning
        } else if ratio >= self.moderate {
            MemoryPressure::Moderate
        } else {
            MemoryPressure::Healthy
        }
    }
}

// ============================================================================
// READINGS
// ============================================================================

/// One process memory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryReading {
    /// Resident set size of the process in bytes.
    pub resident_bytes: u64,
    /// Configured ceiling in bytes.
    pub ceiling_bytes: u64,
    pub sampled_at: DateTime<Utc>,
}

impl MemoryReading {
    pub fn new(resident_bytes: u64, ceiling_bytes: u64) -> Self {
        Self {
            resident_bytes,
            ceiling_bytes,
            sampled_at: Utc::now(),
        }
    }

    /// Resident / ceiling. A zero ceiling reads as fully exhausted.
    pub fn ratio(&self) -> f64 {
        if self.ceiling_bytes == 0 {
            return f64::INFINITY;
        }
        self.resident_bytes as f64 / self.ceiling_bytes as f64
    }

    pub fn percent_of_ceiling(&self) -> f64 {
        self.ratio() * 100.0
    }

    pub fn pressure(&self, thresholds: &MemoryThresholds) -> MemoryPressure {
        thresholds.classify(self.ratio())
    }

    pub fn headroom_bytes(&self) -> u64 {
        self.ceiling_bytes.saturating_sub(self.resident_bytes)
    }
}

/// Advisory figures derived from a reading and the current cache size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryDiagnostics {
    pub pressure: MemoryPressure,
    pub percent_of_ceiling: f64,
    pub headroom_bytes: u64,
    pub cache_entries: usize,
    /// Resident bytes divided by cache entries; `None` with an empty cache.
    pub avg_bytes_per_entry: Option<u64>,
    /// Entries that would fit in the remaining headroom at the current
    /// average; `None` with an empty cache.
    pub estimated_remaining_entries: Option<u64>,
}

impl MemoryDiagnostics {
    pub fn derive(
        reading: &MemoryReading,
        thresholds: &MemoryThresholds,
        cache_entries: usize,
    ) -> Self {
        let avg_bytes_per_entry = (cache_entries > 0)
            .then(|| reading.resident_bytes / cache_entries as u64)
            .filter(|avg| *avg > 0);
        let estimated_remaining_entries =
            avg_bytes_per_entry.map(|avg| reading.headroom_bytes() / avg);

        Self {
            pressure: reading.pressure(thresholds),
            percent_of_ceiling: reading.percent_of_ceiling(),
            headroom_bytes: reading.headroom_bytes(),
            cache_entries,
            avg_bytes_per_entry,
            estimated_remaining_entries,
        }
    }
}

// ============================================================================
// SAMPLING & RESTART SIGNAL
// ============================================================================

/// Source of the process's resident memory size.
pub trait MemorySampler: Send + Sync {
    /// Resident bytes right now, or `None` when the figure is unavailable.
    fn resident_bytes(&self) -> Option<u64>;
}

/// Receives the critical-memory verdict.
///
/// The production implementation terminates the process so the external
/// supervisor restarts it with a clean heap. Nothing else is attempted.
pub trait RestartSignal: Send + Sync {
    fn trigger(&self, reading: &MemoryReading);
}

// ============================================================================
// BYTE SIZES
// ============================================================================

/// A byte count parsed from `1073741824`, `1024K`, `512M`, `1G` or `1.5GB`.
/// Suffixes are binary (1K = 1024).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const KIB: u64 = 1024;
    pub const MIB: u64 = 1024 * 1024;
    pub const GIB: u64 = 1024 * 1024 * 1024;

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn gib(n: u64) -> Self {
        Self(n * Self::GIB)
    }

    pub fn mib(n: u64) -> Self {
        Self(n * Self::MIB)
    }
}

impl FromStr for ByteSize {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            field: "byte size".to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = raw.trim();
        let upper = trimmed.to_ascii_uppercase();
        let without_b = upper
            .strip_suffix("IB")
            .or_else(|| upper.strip_suffix('B'))
            .unwrap_or(&upper);

        let (number, multiplier) = match without_b.chars().last() {
            Some('K') => (&without_b[..without_b.len() - 1], Self::KIB),
            Some('M') => (&without_b[..without_b.len() - 1], Self::MIB),
            Some('G') => (&without_b[..without_b.len() - 1], Self::GIB),
            Some(c) if c.is_ascii_digit() => (without_b, 1),
            _ => return Err(invalid("expected a number with optional K, M or G suffix")),
        };

        let number: f64 = number
            .trim()
            .parse()
            .map_err(|_| invalid("not a number"))?;
        if !number.is_finite() || number <= 0.0 {
            return Err(invalid("must be positive"));
        }

        Ok(Self((number * multiplier as f64).round() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0;
        if bytes >= Self::GIB && bytes % Self::GIB == 0 {
            write!(f, "{}G", bytes / Self::GIB)
        } else if bytes >= Self::MIB && bytes % Self::MIB == 0 {
            write!(f, "{}M", bytes / Self::MIB)
        } else if bytes >= Self::KIB && bytes % Self::KIB == 0 {
            write!(f, "{}K", bytes / Self::KIB)
        } else {
            write!(f, "{}", bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let thresholds = MemoryThresholds::default();
        assert_eq!(thresholds.classify(0.0), MemoryPressure::Healthy);
        assert_eq!(thresholds.classify(0.59), MemoryPressure::Healthy);
        assert_eq!(thresholds.classify(0.60), MemoryPressure::Moderate);
        assert_eq!(thresholds.classify(0.80), MemoryPressure::Warning);
        assert_eq!(thresholds.classify(0.99), MemoryPressure::Warning);
        assert_eq!(thresholds.classify(1.00), MemoryPressure::Critical);
        assert_eq!(thresholds.classify(1.05), MemoryPressure::Critical);
    }

    #[test]
    fn test_pressure_ordering() {
        assert!(MemoryPressure::Critical > MemoryPressure::Warning);
        assert!(MemoryPressure::Warning > MemoryPressure::Moderate);
        assert!(MemoryPressure::Moderate > MemoryPressure::Healthy);
    }

    #[test]
    fn test_reading_ratio_and_headroom() {
        let reading = MemoryReading::new(800, 1000);
        assert!((reading.ratio() - 0.8).abs() < f64::EPSILON);
        assert_eq!(reading.headroom_bytes(), 200);
        assert_eq!(
            reading.pressure(&MemoryThresholds::default()),
            MemoryPressure::Warning
        );
    }

    #[test]
    fn test_zero_ceiling_is_critical() {
        let reading = MemoryReading::new(1, 0);
        assert_eq!(
            reading.pressure(&MemoryThresholds::default()),
            MemoryPressure::Critical
        );
    }

    #[test]
    fn test_diagnostics_with_entries() {
        let reading = MemoryReading::new(400, 1000);
        let diag = MemoryDiagnostics::derive(&reading, &MemoryThresholds::default(), 4);
        assert_eq!(diag.avg_bytes_per_entry, Some(100));
        assert_eq!(diag.estimated_remaining_entries, Some(6));
        assert_eq!(diag.pressure, MemoryPressure::Healthy);
    }

    #[test]
    fn test_diagnostics_empty_cache() {
        let reading = MemoryReading::new(400, 1000);
        let diag = MemoryDiagnostics::derive(&reading, &MemoryThresholds::default(), 0);
        assert_eq!(diag.avg_bytes_per_entry, None);
        assert_eq!(diag.estimated_remaining_entries, None);
    }

    #[test]
    fn test_byte_size_parse() {
        assert_eq!("1G".parse::<ByteSize>().unwrap(), ByteSize::gib(1));
        assert_eq!("1gb".parse::<ByteSize>().unwrap(), ByteSize::gib(1));
        assert_eq!("512M".parse::<ByteSize>().unwrap(), ByteSize::mib(512));
        assert_eq!("512MiB".parse::<ByteSize>().unwrap(), ByteSize::mib(512));
        assert_eq!("2048".parse::<ByteSize>().unwrap(), ByteSize(2048));
        assert_eq!("1.5G".parse::<ByteSize>().unwrap(), ByteSize(3 * ByteSize::GIB / 2));
    }

    #[test]
    fn test_byte_size_rejects_garbage() {
        assert!("".parse::<ByteSize>().is_err());
        assert!("lots".parse::<ByteSize>().is_err());
        assert!("0M".parse::<ByteSize>().is_err());
        assert!("-1G".parse::<ByteSize>().is_err());
    }

    #[test]
    fn test_byte_size_display() {
        assert_eq!(ByteSize::gib(1).to_string(), "1G");
        assert_eq!(ByteSize::mib(300).to_string(), "300M");
        assert_eq!(ByteSize(1000).to_string(), "1000");
    }
}
