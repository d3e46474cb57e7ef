//! icongate Test Utilities
//!
//! Centralized test infrastructure for the icongate workspace:
//! - Stub remote sessions with scripted payloads and failure injection
//! - A scripted memory sampler and a recording restart signal
//! - Proptest generators for search inputs
//! - Test fixtures for common payloads

pub use icongate_core::{
    ByteSize, CacheKey, GatewayError, MemoryReading, MemorySampler, RemoteSession, ResourceError,
    RestartSignal, SearchPayload, SearchQuery, SessionFactory, UpstreamError,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// STUB SESSIONS
// ============================================================================

#[derive(Default)]
struct StubShared {
    default_payload: Mutex<Value>,
    payloads: Mutex<HashMap<String, Value>>,
    fetch_error: Mutex<Option<UpstreamError>>,
    latency: Mutex<Duration>,
    probe_latency: Mutex<Duration>,
    fail_creates: AtomicBool,
    fail_probes: AtomicBool,
    panic_on_fetch: AtomicBool,
    create_calls: AtomicUsize,
    close_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    probes_in_flight: AtomicUsize,
    peak_probes_in_flight: AtomicUsize,
    fetch_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fetch_log: Mutex<Vec<String>>,
    next_session_id: AtomicU64,
}

/// Session factory whose sessions answer from a script.
///
/// All sessions created by one factory share its script and counters, so a
/// test can flip failure modes or inspect calls after handing the factory to
/// the code under test.
#[derive(Clone, Default)]
pub struct StubSessionFactory {
    shared: Arc<StubShared>,
}

impl StubSessionFactory {
    /// Factory answering every query with [`fixtures::home_payload`].
    pub fn new() -> Self {
        let factory = Self::default();
        *lock(&factory.shared.default_payload) = fixtures::home_payload();
        factory
    }

    /// Answer every query without a specific script with `payload`.
    pub fn with_payload(self, payload: Value) -> Self {
        *lock(&self.shared.default_payload) = payload;
        self
    }

    /// Answer `query` with `payload`.
    pub fn with_query_payload(self, query: &str, payload: Value) -> Self {
        lock(&self.shared.payloads).insert(query.to_string(), payload);
        self
    }

    /// Delay every fetch by `latency` (tokio time, so paused clocks apply).
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.shared.latency) = latency;
        self
    }

    /// Delay every probe by `latency`.
    pub fn with_probe_latency(self, latency: Duration) -> Self {
        *lock(&self.shared.probe_latency) = latency;
        self
    }

    /// Fail every fetch with `error` until cleared.
    pub fn fail_fetches_with(&self, error: Option<UpstreamError>) {
        *lock(&self.shared.fetch_error) = error;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.shared.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_probes(&self, fail: bool) {
        self.shared.fail_probes.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_fetch(&self, panic: bool) {
        self.shared.panic_on_fetch.store(panic, Ordering::SeqCst);
    }

    pub fn create_calls(&self) -> usize {
        self.shared.create_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.shared.probe_calls.load(Ordering::SeqCst)
    }

    /// Highest number of probes ever inside the stub at once.
    pub fn peak_probes_in_flight(&self) -> usize {
        self.shared.peak_probes_in_flight.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.shared.fetch_calls.load(Ordering::SeqCst)
    }

    /// Fetches currently inside the stub.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of fetches ever inside the stub at once.
    pub fn peak_in_flight(&self) -> usize {
        self.shared.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Queries in the order their fetches started.
    pub fn fetch_log(&self) -> Vec<String> {
        lock(&self.shared.fetch_log).clone()
    }
}

#[async_trait]
impl SessionFactory for StubSessionFactory {
    async fn create(&self) -> Result<Box<dyn RemoteSession>, ResourceError> {
        self.shared.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_creates.load(Ordering::SeqCst) {
            return Err(ResourceError::CreationFailed {
                reason: "stub configured to fail creation".to_string(),
            });
        }
        let id = self.shared.next_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(StubSession {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn describe(&self) -> String {
        "stub session".to_string()
    }
}

/// One session created by [`StubSessionFactory`].
pub struct StubSession {
    id: u64,
    shared: Arc<StubShared>,
}

impl StubSession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Decrements an in-flight counter even if the call is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteSession for StubSession {
    async fn probe(&self) -> Result<(), ResourceError> {
        self.shared.probe_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.shared.probes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.shared.probes_in_flight);
        self.shared.peak_probes_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *lock(&self.shared.probe_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.shared.fail_probes.load(Ordering::SeqCst) {
            return Err(ResourceError::ProbeFailed {
                reason: format!("stub session {} configured to fail probes", self.id),
            });
        }
        Ok(())
    }

    async fn fetch(&self, query: &SearchQuery) -> Result<Value, UpstreamError> {
        self.shared.fetch_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.shared.fetch_log).push(query.query().to_string());

        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(&self.shared.in_flight);
        self.shared.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *lock(&self.shared.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        } else {
            tokio::task::yield_now().await;
        }

        if self.shared.panic_on_fetch.load(Ordering::SeqCst) {
            panic!("stub session configured to panic");
        }
        if let Some(error) = lock(&self.shared.fetch_error).clone() {
            return Err(error);
        }

        let scripted = lock(&self.shared.payloads).get(query.query()).cloned();
        Ok(scripted.unwrap_or_else(|| lock(&self.shared.default_payload).clone()))
    }

    async fn close(&self) {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// Memory sampler returning whatever the test last set.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    bytes: AtomicU64,
    available: AtomicBool,
}

impl ScriptedSampler {
    pub fn new(bytes: u64) -> Self {
        Self {
            bytes: AtomicU64::new(bytes),
            available: AtomicBool::new(true),
        }
    }

    /// Sampler that never produces a reading.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn set(&self, bytes: u64) {
        self.bytes.store(bytes, Ordering::SeqCst);
        self.available.store(true, Ordering::SeqCst);
    }
}

impl MemorySampler for ScriptedSampler {
    fn resident_bytes(&self) -> Option<u64> {
        self.available
            .load(Ordering::SeqCst)
            .then(|| self.bytes.load(Ordering::SeqCst))
    }
}

/// Restart signal that records readings instead of exiting.
#[derive(Debug, Default)]
pub struct RecordingRestartSignal {
    readings: Mutex<Vec<MemoryReading>>,
}

impl RecordingRestartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        lock(&self.readings).len()
    }

    pub fn readings(&self) -> Vec<MemoryReading> {
        lock(&self.readings).clone()
    }
}

impl RestartSignal for RecordingRestartSignal {
    fn trigger(&self, reading: &MemoryReading) {
        lock(&self.readings).push(reading.clone());
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for search inputs.

    use icongate_core::{SearchQuery, MAX_SEARCH_LIMIT, MIN_SEARCH_LIMIT};
    use proptest::prelude::*;

    /// Non-blank query text.
    pub fn arb_query_text() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,15}"
    }

    pub fn arb_limit() -> impl Strategy<Value = u32> {
        MIN_SEARCH_LIMIT..=MAX_SEARCH_LIMIT
    }

    /// Limits the service rejects.
    pub fn arb_invalid_limit() -> impl Strategy<Value = u32> {
        prop_oneof![Just(0u32), (MAX_SEARCH_LIMIT + 1)..=u32::MAX]
    }

    pub fn arb_search_query() -> impl Strategy<Value = SearchQuery> {
        (arb_query_text(), arb_limit()).prop_filter_map("valid query", |(query, limit)| {
            SearchQuery::new(query, Some(limit)).ok()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canned upstream payloads.

    use serde_json::{json, Value};

    /// `{total: 1, items: [{name: "home"}]}`
    pub fn home_payload() -> Value {
        json!({
            "total": 1,
            "items": [{ "name": "home" }]
        })
    }

    /// Payload shaped like the live search endpoint's answer.
    pub fn iconify_payload(query: &str, icons: &[&str]) -> Value {
        let names: Vec<String> = icons.iter().map(|icon| format!("mdi:{}", icon)).collect();
        json!({
            "icons": names,
            "total": icons.len(),
            "limit": 999,
            "start": 0,
            "collections": {
                "mdi": { "name": "Material Design Icons", "total": 7447 }
            },
            "request": { "query": query }
        })
    }

    /// Document the endpoint returns when it rejects a search.
    pub fn error_payload(message: &str) -> Value {
        json!({ "error": message })
    }
}
