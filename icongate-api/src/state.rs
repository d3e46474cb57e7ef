//! Shared application state for Axum routers.
//!
//! `AppState` is the single owner of every piece of mutable runtime state:
//! the session handle, the admission queue, the cache (through the search
//! service) and the memory monitor. It is built once, warmed up by `init`,
//! cloned into the router, and torn down by `shutdown`.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use icongate_core::{MemorySampler, RestartSignal, SessionFactory};
use icongate_storage::SearchCache;

use crate::config::ApiConfig;
use crate::monitor::{ExitProcess, HealthMonitor, ProcessMemorySampler};
use crate::queue::AdmissionQueue;
use crate::services::SearchService;
use crate::session::{HttpSessionConfig, HttpSessionFactory, ResourceHandle, ResourceState};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    /// Owner of the single upstream session.
    pub handle: Arc<ResourceHandle>,
    pub queue: AdmissionQueue,
    pub search: Arc<SearchService>,
    pub monitor: Arc<HealthMonitor>,
    pub start_time: Instant,
}

crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<ResourceHandle>, handle);
crate::impl_from_ref!(AdmissionQueue, queue);
crate::impl_from_ref!(Arc<SearchService>, search);
crate::impl_from_ref!(Arc<HealthMonitor>, monitor);
crate::impl_from_ref!(Instant, start_time);

impl AppState {
    /// Wire the state from its collaborators. Nothing is contacted yet.
    pub fn new(
        config: ApiConfig,
        factory: Arc<dyn SessionFactory>,
        sampler: Arc<dyn MemorySampler>,
        restart: Arc<dyn RestartSignal>,
    ) -> Self {
        let handle = Arc::new(ResourceHandle::new(factory));
        let queue = AdmissionQueue::new(config.max_concurrent);
        let cache = Arc::new(Mutex::new(SearchCache::new(
            config.max_cache_size,
            config.cache_ttl,
        )));
        let search = Arc::new(SearchService::new(cache, queue.clone(), Arc::clone(&handle)));
        let monitor = Arc::new(HealthMonitor::new(sampler, restart, config.memory_ceiling));

        Self {
            config: Arc::new(config),
            handle,
            queue,
            search,
            monitor,
            start_time: Instant::now(),
        }
    }

    /// Production wiring: HTTP session, process memory sampler, exit on
    /// critical memory.
    pub fn from_config(config: ApiConfig) -> Self {
        let factory = HttpSessionFactory::new(HttpSessionConfig::from_api_config(&config));
        Self::new(
            config,
            Arc::new(factory),
            Arc::new(ProcessMemorySampler::new()),
            Arc::new(ExitProcess),
        )
    }

    /// Warm up the upstream session.
    ///
    /// A failure is logged and left for the first search to retry.
    pub async fn init(&self) -> ResourceState {
        match self.handle.acquire().await {
            Ok(lease) => {
                tracing::info!(generation = lease.generation(), "Upstream session ready");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upstream session warm-up failed; will retry on first search");
            }
        }
        self.handle.state()
    }

    /// Refuse new searches and release the upstream session.
    pub async fn shutdown(&self) {
        self.queue.close();
        self.handle.close().await;
        let stats = self.search.stats();
        tracing::info!(
            total_requests = stats.total_requests,
            cache_hits = stats.cache_hits,
            errors = stats.errors,
            uptime_secs = self.start_time.elapsed().as_secs(),
            "Application state shut down"
        );
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("queue", &self.queue)
            .field("handle_state", &self.handle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use icongate_core::ResourceError;
    use icongate_test_utils::{RecordingRestartSignal, ScriptedSampler, StubSessionFactory};

    fn state(factory: &StubSessionFactory) -> AppState {
        AppState::new(
            ApiConfig::default(),
            Arc::new(factory.clone()),
            Arc::new(ScriptedSampler::new(1024)),
            Arc::new(RecordingRestartSignal::new()),
        )
    }

    #[tokio::test]
    async fn test_init_warms_session() {
        let factory = StubSessionFactory::new();
        let state = state(&factory);
        assert_eq!(state.handle.state(), ResourceState::Uninitialized);

        assert_eq!(state.init().await, ResourceState::Ready);
        assert_eq!(factory.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_not_fatal() {
        let factory = StubSessionFactory::new();
        factory.fail_creates(true);
        let state = state(&factory);

        assert_eq!(state.init().await, ResourceState::Uninitialized);

        factory.fail_creates(false);
        let outcome = state.search.search_params(Some("home"), None).await.unwrap();
        assert!(!outcome.cached);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let factory = StubSessionFactory::new();
        let state = state(&factory);
        state.init().await;

        state.shutdown().await;
        assert!(state.queue.is_closed());
        assert_eq!(state.handle.state(), ResourceState::Closed);
        assert_eq!(factory.close_calls(), 1);
        assert!(matches!(state.handle.acquire().await, Err(ResourceError::Closed)));
    }

    #[test]
    fn test_queue_limit_follows_config() {
        let mut config = ApiConfig::default();
        config.max_concurrent = 3;
        let state = AppState::new(
            config,
            Arc::new(StubSessionFactory::new()),
            Arc::new(ScriptedSampler::new(1024)),
            Arc::new(RecordingRestartSignal::new()),
        );
        assert_eq!(state.queue.limit(), 3);
        assert_eq!(state.search.cache_snapshot().stats.capacity, 1000);
    }
}
