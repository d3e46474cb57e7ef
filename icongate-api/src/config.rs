//! API Configuration Module
//!
//! Every tunable is read from the environment with a default suited to a
//! single small instance. Unparseable values fall back to the default and
//! are logged; `validate()` then rejects values the service cannot run with.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use icongate_core::{ByteSize, ConfigError};
use serde::Serialize;

use crate::constants::*;

// ============================================================================
// LOG FORMAT
// ============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(ConfigError::InvalidValue {
                field: "ICONGATE_LOG_FORMAT".to_string(),
                value: other.to_string(),
                reason: "expected json or pretty".to_string(),
            }),
        }
    }
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Runtime configuration of the gateway.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Server
    // ========================================================================
    pub host: String,
    pub port: u16,

    // ========================================================================
    // Admission & cache
    // ========================================================================
    /// Upstream fetches allowed in flight at once.
    pub max_concurrent: usize,

    /// Maximum number of cached results.
    pub max_cache_size: usize,

    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,

    // ========================================================================
    // Health
    // ========================================================================
    /// Resident memory at which the process restarts itself.
    pub memory_ceiling: ByteSize,

    pub memory_check_interval: Duration,
    pub keep_alive_interval: Duration,

    // ========================================================================
    // Upstream
    // ========================================================================
    pub upstream_base_url: String,
    pub upstream_referer: String,
    pub upstream_timeout: Duration,

    // ========================================================================
    // CORS
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins.
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Logging
    // ========================================================================
    pub log_format: LogFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
            memory_ceiling: ByteSize(DEFAULT_MAX_MEMORY_CEILING_BYTES),
            memory_check_interval: Duration::from_secs(DEFAULT_MEMORY_CHECK_INTERVAL_SECS),
            keep_alive_interval: Duration::from_secs(DEFAULT_KEEP_ALIVE_INTERVAL_SECS),
            upstream_base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            upstream_referer: DEFAULT_UPSTREAM_REFERER.to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            log_format: LogFormat::Json,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`, `ICONGATE_BIND`: listen address (default: 0.0.0.0:3000)
    /// - `MAX_CONCURRENT`: admission limit (default: 10)
    /// - `MAX_CACHE_SIZE`: cache capacity (default: 1000)
    /// - `MAX_MEMORY_CEILING`: bytes or K/M/G suffix (default: 1G)
    /// - `CACHE_TTL_SECS`: entry TTL (default: 300)
    /// - `CACHE_SWEEP_INTERVAL_SECS`: sweep period (default: 60)
    /// - `KEEP_ALIVE_INTERVAL_SECS`: probe period (default: 120)
    /// - `MEMORY_CHECK_INTERVAL_SECS`: memory sample period (default: 30)
    /// - `UPSTREAM_BASE_URL`, `UPSTREAM_REFERER`, `UPSTREAM_TIMEOUT_SECS`
    /// - `ICONGATE_CORS_ORIGINS`: comma-separated origins (empty = allow all)
    /// - `ICONGATE_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `ICONGATE_LOG_FORMAT`: "json" or "pretty" (default: json)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |name: &str, default: Duration| {
            Duration::from_secs(parse_or(&lookup, name, default.as_secs()))
        };

        let cors_origins = lookup("ICONGATE_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("ICONGATE_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            host: lookup("ICONGATE_BIND").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            max_concurrent: parse_or(&lookup, "MAX_CONCURRENT", defaults.max_concurrent),
            max_cache_size: parse_or(&lookup, "MAX_CACHE_SIZE", defaults.max_cache_size),
            cache_ttl: secs("CACHE_TTL_SECS", defaults.cache_ttl),
            cache_sweep_interval: secs("CACHE_SWEEP_INTERVAL_SECS", defaults.cache_sweep_interval),
            memory_ceiling: parse_or(&lookup, "MAX_MEMORY_CEILING", defaults.memory_ceiling),
            memory_check_interval: secs(
                "MEMORY_CHECK_INTERVAL_SECS",
                defaults.memory_check_interval,
            ),
            keep_alive_interval: secs("KEEP_ALIVE_INTERVAL_SECS", defaults.keep_alive_interval),
            upstream_base_url: lookup("UPSTREAM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream_base_url),
            upstream_referer: lookup("UPSTREAM_REFERER").unwrap_or(defaults.upstream_referer),
            upstream_timeout: secs("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout),
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: parse_or(
                &lookup,
                "ICONGATE_CORS_MAX_AGE_SECS",
                defaults.cors_max_age_secs,
            ),
            log_format: parse_or(&lookup, "ICONGATE_LOG_FORMAT", defaults.log_format),
        }
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("MAX_CONCURRENT", self.max_concurrent as u64),
            ("MAX_CACHE_SIZE", self.max_cache_size as u64),
            ("MAX_MEMORY_CEILING", self.memory_ceiling.as_u64()),
            ("CACHE_TTL_SECS", self.cache_ttl.as_secs()),
            ("CACHE_SWEEP_INTERVAL_SECS", self.cache_sweep_interval.as_secs()),
            ("KEEP_ALIVE_INTERVAL_SECS", self.keep_alive_interval.as_secs()),
            ("MEMORY_CHECK_INTERVAL_SECS", self.memory_check_interval.as_secs()),
            ("UPSTREAM_TIMEOUT_SECS", self.upstream_timeout.as_secs()),
        ];
        if let Some((field, value)) = positive.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if !self.upstream_base_url.starts_with("http://")
            && !self.upstream_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                field: "UPSTREAM_BASE_URL".to_string(),
                value: self.upstream_base_url.clone(),
                reason: "must be an http(s) URL".to_string(),
            });
        }

        self.bind_addr().map(|_| ())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "ICONGATE_BIND".to_string(),
                value: addr,
                reason: e.to_string(),
            })
    }

    /// Whether CORS is limited to an explicit origin allow-list.
    pub fn restricts_origins(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// The parts of the configuration worth reporting over HTTP.
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            max_concurrent: self.max_concurrent,
            max_cache_size: self.max_cache_size,
            cache_ttl_secs: self.cache_ttl.as_secs(),
            cache_sweep_interval_secs: self.cache_sweep_interval.as_secs(),
            max_memory_ceiling: self.memory_ceiling.to_string(),
            max_memory_ceiling_bytes: self.memory_ceiling.as_u64(),
            memory_check_interval_secs: self.memory_check_interval.as_secs(),
            keep_alive_interval_secs: self.keep_alive_interval.as_secs(),
            upstream_base_url: self.upstream_base_url.clone(),
            upstream_timeout_secs: self.upstream_timeout.as_secs(),
        }
    }
}

/// Effective configuration as reported by `/api/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub max_concurrent: usize,
    pub max_cache_size: usize,
    pub cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,
    pub max_memory_ceiling: String,
    pub max_memory_ceiling_bytes: u64,
    pub memory_check_interval_secs: u64,
    pub keep_alive_interval_secs: u64,
    pub upstream_base_url: String,
    pub upstream_timeout_secs: u64,
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Unparseable value, using default");
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ApiConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.max_cache_size, 1000);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.keep_alive_interval, Duration::from_secs(120));
        assert_eq!(config.memory_ceiling, ByteSize::gib(1));
        assert_eq!(config.memory_ceiling, "1G".parse::<ByteSize>().unwrap());
        assert!(config.cors_origins.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_lookup_matches_default() {
        let config = config_from(&[]);
        let defaults = ApiConfig::default();
        assert_eq!(config.port, defaults.port);
        assert_eq!(config.upstream_base_url, defaults.upstream_base_url);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("MAX_CONCURRENT", "4"),
            ("MAX_CACHE_SIZE", "50"),
            ("MAX_MEMORY_CEILING", "512M"),
            ("CACHE_TTL_SECS", "10"),
            ("UPSTREAM_BASE_URL", "http://localhost:9000/"),
            ("ICONGATE_CORS_ORIGINS", "https://a.example, https://b.example,"),
            ("ICONGATE_LOG_FORMAT", "pretty"),
        ]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.max_cache_size, 50);
        assert_eq!(config.memory_ceiling, ByteSize::mib(512));
        assert_eq!(config.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.upstream_base_url, "http://localhost:9000");
        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.restricts_origins());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_unparseable_falls_back() {
        let config = config_from(&[("MAX_CONCURRENT", "lots"), ("MAX_MEMORY_CEILING", "huge")]);
        assert_eq!(config.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(config.memory_ceiling, ByteSize::gib(1));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = config_from(&[("MAX_CONCURRENT", "0")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("MAX_CONCURRENT"));

        let config = config_from(&[("MAX_CACHE_SIZE", "0")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_upstream() {
        let config = config_from(&[("UPSTREAM_BASE_URL", "ftp://example.com")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let config = config_from(&[("ICONGATE_BIND", "127.0.0.1"), ("PORT", "4000")]);
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:4000");

        let config = config_from(&[("ICONGATE_BIND", "not a host")]);
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_summary_reports_ceiling() {
        let summary = ApiConfig::default().summary();
        assert_eq!(summary.max_memory_ceiling, "1G");
        assert_eq!(summary.max_memory_ceiling_bytes, ByteSize::GIB);
    }
}
