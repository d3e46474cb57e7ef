//! Resource handle for the single shared remote session.
//!
//! State machine:
//!
//! ```text
//! Uninitialized --acquire--> Ready --probe fails--> Degraded
//!       ^                      ^                       |
//!       |                      +------acquire ok-------+
//!       +-------------acquire fails--------------------+
//! any --close--> Closed
//! ```
//!
//! The handle owns the session; callers borrow it through a [`SessionLease`]
//! for the duration of one queued task. Creation and teardown are serialized
//! behind an async mutex, so at most one session is ever live. Probes run
//! outside it and compare the session generation before discarding.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use icongate_core::{RemoteSession, ResourceError, SessionFactory};
use serde::Serialize;
use tokio::sync::Mutex;

// ============================================================================
// STATE
// ============================================================================

/// Lifecycle state of the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    /// No session has been created, or the last creation failed.
    Uninitialized,
    /// A session exists and its last probe or creation succeeded.
    Ready,
    /// The last probe failed; the stale session has been discarded.
    Degraded,
    /// Shut down; no further sessions will be created.
    Closed,
}

impl ResourceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Uninitialized => "uninitialized",
            ResourceState::Ready => "ready",
            ResourceState::Degraded => "degraded",
            ResourceState::Closed => "closed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Alive,
    Dead,
}

// ============================================================================
// LEASE
// ============================================================================

/// Borrowed access to the live session for one task.
///
/// Deliberately not `Clone`: a lease is taken per task and dropped with it.
pub struct SessionLease {
    session: Arc<dyn RemoteSession>,
    generation: u64,
}

impl SessionLease {
    /// Sequence number of the session this lease borrows.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Deref for SessionLease {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("generation", &self.generation)
            .finish()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Lifecycle counters for the shared session.
#[derive(Debug, Default)]
pub struct HandleMetrics {
    pub sessions_created: AtomicU64,
    pub creation_failures: AtomicU64,
    pub probes: AtomicU64,
    pub probe_failures: AtomicU64,
}

impl HandleMetrics {
    pub fn snapshot(&self) -> HandleSnapshot {
        HandleSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of handle counters at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandleSnapshot {
    pub sessions_created: u64,
    pub creation_failures: u64,
    pub probes: u64,
    pub probe_failures: u64,
}

// ============================================================================
// HANDLE
// ============================================================================

struct Slot {
    session: Option<Arc<dyn RemoteSession>>,
    generation: u64,
    closed: bool,
}

/// Owner of the single shared remote session.
pub struct ResourceHandle {
    factory: Arc<dyn SessionFactory>,
    slot: Mutex<Slot>,
    state: StdMutex<ResourceState>,
    metrics: HandleMetrics,
}

impl ResourceHandle {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot {
                session: None,
                generation: 0,
                closed: false,
            }),
            state: StdMutex::new(ResourceState::Uninitialized),
            metrics: HandleMetrics::default(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResourceState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn metrics(&self) -> HandleSnapshot {
        self.metrics.snapshot()
    }

    /// Borrow the live session, creating or repairing it first if needed.
    ///
    /// An existing session is probed without holding the slot, so concurrent
    /// callers probe in parallel. If the probe fails the session is torn down
    /// and replaced. Creation failures are returned as-is, without retry.
    pub async fn acquire(&self) -> Result<SessionLease, ResourceError> {
        let current = {
            let slot = self.slot.lock().await;
            if slot.closed {
                return Err(ResourceError::Closed);
            }
            slot.session.clone().map(|session| (session, slot.generation))
        };

        if let Some((session, generation)) = current {
            if self.check(&session, generation).await {
                return Ok(SessionLease {
                    session,
                    generation,
                });
            }
        }

        let mut slot = self.slot.lock().await;
        if slot.closed {
            return Err(ResourceError::Closed);
        }
        // Another caller may have created a session while this one probed.
        if let Some(session) = slot.session.clone() {
            return Ok(SessionLease {
                session,
                generation: slot.generation,
            });
        }
        self.create_locked(&mut slot).await
    }

    /// Liveness round-trip through the current session.
    ///
    /// A failed probe discards the session and moves the handle to
    /// `Degraded`; with no session the result is `Dead` and nothing changes.
    pub async fn probe(&self) -> ProbeOutcome {
        let current = {
            let slot = self.slot.lock().await;
            slot.session.clone().map(|session| (session, slot.generation))
        };
        let Some((session, generation)) = current else {
            return ProbeOutcome::Dead;
        };

        if self.check(&session, generation).await {
            ProbeOutcome::Alive
        } else {
            ProbeOutcome::Dead
        }
    }

    /// Probe `session` outside the slot lock. On failure the session is
    /// discarded, unless `generation` has already been replaced or closed.
    async fn check(&self, session: &Arc<dyn RemoteSession>, generation: u64) -> bool {
        self.metrics.probes.fetch_add(1, Ordering::Relaxed);
        let Err(e) = session.probe().await else {
            return true;
        };
        self.metrics.probe_failures.fetch_add(1, Ordering::Relaxed);

        let mut slot = self.slot.lock().await;
        if slot.generation == generation && slot.session.is_some() {
            tracing::warn!(
                generation,
                error = %e,
                "Session failed liveness check, discarding"
            );
            slot.session = None;
            self.set_state(ResourceState::Degraded);
            session.close().await;
        }
        false
    }

    /// Release the session and refuse any further acquisition.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let mut slot = self.slot.lock().await;
        if slot.closed {
            return;
        }
        slot.closed = true;
        self.set_state(ResourceState::Closed);

        if let Some(session) = slot.session.take() {
            session.close().await;
            tracing::info!(generation = slot.generation, "Session closed");
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.slot.lock().await.closed
    }

    async fn create_locked(&self, slot: &mut Slot) -> Result<SessionLease, ResourceError> {
        tracing::info!(factory = %self.factory.describe(), "Creating remote session");
        match self.factory.create().await {
            Ok(session) => {
                let session: Arc<dyn RemoteSession> = Arc::from(session);
                slot.generation += 1;
                slot.session = Some(Arc::clone(&session));
                self.metrics.sessions_created.fetch_add(1, Ordering::Relaxed);
                self.set_state(ResourceState::Ready);
                tracing::info!(generation = slot.generation, "Remote session ready");
                Ok(SessionLease {
                    session,
                    generation: slot.generation,
                })
            }
            Err(e) => {
                self.metrics.creation_failures.fetch_add(1, Ordering::Relaxed);
                self.set_state(ResourceState::Uninitialized);
                tracing::error!(error = %e, "Remote session creation failed");
                Err(e)
            }
        }
    }

    fn set_state(&self, next: ResourceState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("state", &self.state())
            .field("factory", &self.factory.describe())
            .finish()
    }
}
