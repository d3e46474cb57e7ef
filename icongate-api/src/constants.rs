//! Constants for icongate API
//!
//! Default values for every tunable, plus the fixed identity the upstream
//! session presents to the icon catalog.

// ============================================================================
// SERVER
// ============================================================================

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Default listen host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

// ============================================================================
// ADMISSION & CACHE
// ============================================================================

/// Default number of upstream fetches allowed in flight at once
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default maximum number of cached search results
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// Default cache entry time-to-live in seconds (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default period of the expired-entry sweep in seconds
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// HEALTH
// ============================================================================

/// Default memory ceiling in bytes before the process restarts itself (1G)
pub const DEFAULT_MAX_MEMORY_CEILING_BYTES: u64 = 1024 * 1024 * 1024;

/// Default period of the memory sample in seconds
pub const DEFAULT_MEMORY_CHECK_INTERVAL_SECS: u64 = 30;

/// Default period of the session keep-alive probe in seconds (2 minutes)
pub const DEFAULT_KEEP_ALIVE_INTERVAL_SECS: u64 = 120;

/// Exit code used when the process terminates on critical memory pressure
pub const MEMORY_RESTART_EXIT_CODE: i32 = 1;

// ============================================================================
// UPSTREAM
// ============================================================================

/// Default base URL of the icon search API
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://api.iconify.design";

/// Default landing page; sent as Referer and used as the probe target
pub const DEFAULT_UPSTREAM_REFERER: &str = "https://icon-sets.iconify.design/";

/// Default per-request upstream timeout in seconds
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// User agent presented to the icon catalog
pub const UPSTREAM_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// LOGGING
// ============================================================================

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "icongate_api=debug,tower_http=info,info";
