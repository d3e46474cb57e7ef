//! Admission queue bounding concurrent use of the shared session.
//!
//! Submitted tasks wait in a FIFO ledger. A single pump task takes a permit
//! from a semaphore sized to `limit`, pops the head of the ledger and runs it
//! on its own tokio task with the permit moved in. The permit is released on
//! every exit path of that task, including a panic, which wakes the pump for
//! the next head.
//!
//! Admission is strict FIFO; completion order is not constrained. A queued
//! task runs to completion even if its submitter has gone away.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use icongate_core::{GatewayError, GatewayResult};
use serde::Serialize;
use tokio::sync::{oneshot, Notify, Semaphore};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Job = Box<dyn FnOnce() -> BoxFuture + Send + 'static>;

struct PendingTask {
    ticket: u64,
    job: Job,
}

struct QueueState {
    pending: VecDeque<PendingTask>,
    next_ticket: u64,
    closed: bool,
}

// ============================================================================
// METRICS
// ============================================================================

/// Queue activity counters.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    pub submitted: AtomicU64,
    pub started: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    /// Tasks that panicked before producing a result.
    pub aborted: AtomicU64,
    pub rejected: AtomicU64,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    pub limit: usize,
    /// Tasks waiting for admission.
    pub pending: usize,
    /// Tasks currently executing.
    pub in_flight: usize,
    pub submitted: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub aborted: u64,
    pub rejected: u64,
}

// ============================================================================
// QUEUE
// ============================================================================

struct QueueInner {
    limit: usize,
    /// One permit per admission slot.
    slots: Arc<Semaphore>,
    state: Mutex<QueueState>,
    /// Signalled on every submission and on close.
    work: Notify,
    pump_started: AtomicBool,
    metrics: QueueMetrics,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.slots.available_permits())
    }

    /// Spawn the pump on first use, on the submitter's runtime.
    fn ensure_pump(self: &Arc<Self>) -> GatewayResult<()> {
        if self.pump_started.load(Ordering::Acquire) {
            return Ok(());
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            GatewayError::TaskAborted {
                reason: format!("no runtime to run queued tasks: {}", e),
            }
        })?;
        if !self.pump_started.swap(true, Ordering::AcqRel) {
            runtime.spawn(run_pump(Arc::clone(self)));
        }
        Ok(())
    }
}

/// Admit queued tasks in FIFO order as slots free up.
///
/// Only the pump pops the ledger, so the head seen before waiting for a
/// permit is still the head once the permit arrives. Exits once the queue
/// is closed and drained.
async fn run_pump(inner: Arc<QueueInner>) {
    loop {
        loop {
            let (has_work, closed) = {
                let state = inner.lock();
                (!state.pending.is_empty(), state.closed)
            };
            if has_work {
                break;
            }
            if closed {
                tracing::debug!("Admission pump stopped");
                return;
            }
            inner.work.notified().await;
        }

        let permit = match Arc::clone(&inner.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let Some(task) = inner.lock().pending.pop_front() else {
            continue;
        };

        inner.metrics.started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(ticket = task.ticket, "Admitted queued task");
        let future = (task.job)();
        tokio::spawn(async move {
            let _permit = permit;
            future.await;
        });
    }
}

/// FIFO admission queue with a fixed concurrency limit.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<QueueInner>,
}

impl AdmissionQueue {
    /// Create a queue admitting at most `limit` concurrent tasks.
    /// A zero limit is treated as one.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            inner: Arc::new(QueueInner {
                limit,
                slots: Arc::new(Semaphore::new(limit)),
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    next_ticket: 0,
                    closed: false,
                }),
                work: Notify::new(),
                pump_started: AtomicBool::new(false),
                metrics: QueueMetrics::default(),
            }),
        }
    }

    /// Queue `task` and wait for its result.
    ///
    /// The closure is invoked at admission time, on the pump, and the future
    /// it returns runs on a fresh tokio task. A panic inside the task is
    /// reported as [`GatewayError::TaskAborted`].
    pub async fn submit<F, Fut, T>(&self, task: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = GatewayResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let result = task().await;
                let counter = if result.is_ok() {
                    &inner.metrics.succeeded
                } else {
                    &inner.metrics.failed
                };
                counter.fetch_add(1, Ordering::Relaxed);
                // The submitter may have gone away; the task still ran.
                let _ = tx.send(result);
            })
        });

        {
            let mut state = self.inner.lock();
            if state.closed {
                self.inner.metrics.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::QueueClosed);
            }
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.pending.push_back(PendingTask { ticket, job });
        }
        self.inner.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        self.inner.ensure_pump()?;
        self.inner.work.notify_one();

        rx.await.map_err(|_| {
            self.inner.metrics.aborted.fetch_add(1, Ordering::Relaxed);
            GatewayError::TaskAborted {
                reason: "task panicked before producing a result".to_string(),
            }
        })?
    }

    /// Refuse new submissions. Already queued tasks still run.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.inner.work.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn limit(&self) -> usize {
        self.inner.limit
    }

    /// Tasks waiting for admission.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Tasks holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let pending = self.inner.lock().pending.len();
        let metrics = &self.inner.metrics;
        QueueSnapshot {
            limit: self.inner.limit,
            pending,
            in_flight: self.inner.in_flight(),
            submitted: metrics.submitted.load(Ordering::Relaxed),
            started: metrics.started.load(Ordering::Relaxed),
            succeeded: metrics.succeeded.load(Ordering::Relaxed),
            failed: metrics.failed.load(Ordering::Relaxed),
            aborted: metrics.aborted.load(Ordering::Relaxed),
            rejected: metrics.rejected.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for AdmissionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (pending, closed) = {
            let state = self.inner.lock();
            (state.pending.len(), state.closed)
        };
        f.debug_struct("AdmissionQueue")
            .field("limit", &self.inner.limit)
            .field("pending", &pending)
            .field("in_flight", &self.inner.in_flight())
            .field("closed", &closed)
            .finish()
    }
}
