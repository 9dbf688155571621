//! Per-run control primitives.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Backpressure signal between the flow controller and the producer,
/// scoped to a single run.
///
/// The queue flips the gate; the pipeline pump awaits
/// [`ready`](Self::ready) before each unit of work. A read issued before
/// `pause` lands normally; only the next pull waits.
#[derive(Clone, Debug, Default)]
pub struct BackpressureGate {
    inner: Arc<GateInner>,
}

#[derive(Debug, Default)]
struct GateInner {
    paused: AtomicBool,
    notify: Notify,
}

impl BackpressureGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    /// Wait until the gate is open.
    pub async fn ready(&self) {
        loop {
            if !self.is_paused() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_paused() {
                return;
            }
            notified.await;
        }
    }
}

/// Where a run currently is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    /// Target readiness (mapping/schema creation) before any source I/O.
    Preparing,
    /// Source and queue both active.
    Running,
    /// Source exhausted; the queue is flushing trailing and in-flight work.
    Draining,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunPhase::Idle => "idle",
            RunPhase::Preparing => "preparing",
            RunPhase::Running => "running",
            RunPhase::Draining => "draining",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        write!(f, "{label}")
    }
}
