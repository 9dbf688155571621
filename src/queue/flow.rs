//! The flow controller: decouples single-stream production from concurrent
//! batched consumption.
//!
//! Documents accumulate into the current batch; sealed batches dispatch to
//! the bulk sink under a bounded (optionally latency-adaptive) in-flight
//! limit, and buffered bytes are held between high/low water marks by
//! pausing and resuming the producer through the run's
//! [`BackpressureGate`].

use miette::Diagnostic;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use super::adaptive::ConcurrencyController;
use super::batch::{Batch, BulkBuffer};
use crate::config::QueueConfig;
use crate::document::Document;
use crate::event_bus::{BusEmitter, EventEmitter, PipelineEvent};
use crate::pipeline::BackpressureGate;
use crate::sink::{BulkSink, SinkError, WriteOutcome};

/// The producer violated the queue protocol; this signals an implementation
/// bug, not an operational failure.
#[derive(Debug, Error, Diagnostic)]
pub enum ProtocolError {
    #[error("add() called after finish(); the source ignored the finish signal")]
    #[diagnostic(code(docflux::queue::add_after_finish))]
    AddAfterFinish,
}

/// Point-in-time view of the flow controller, for observability and tests.
#[derive(Clone, Debug)]
pub struct QueueState {
    pub buffered_bytes: usize,
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub pending_batches: usize,
    pub paused: bool,
    pub recent_latencies: Vec<Duration>,
}

/// Counters reported when the queue drains cleanly.
#[derive(Clone, Debug)]
pub struct QueueStats {
    pub docs_submitted: u64,
    pub docs_flushed: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

struct QueueShared {
    sink: Arc<dyn BulkSink>,
    emitter: BusEmitter,
    gate: BackpressureGate,
    cfg: QueueConfig,
    drained: tokio::sync::Notify,
    started: Instant,
}

struct QueueInner {
    buffer: BulkBuffer,
    pending: VecDeque<Batch>,
    buffered_bytes: usize,
    in_flight: usize,
    controller: ConcurrencyController,
    paused: bool,
    finishing: bool,
    failed: Option<SinkError>,
    docs_submitted: u64,
    docs_flushed: u64,
    batches_flushed: u64,
}

/// Batching write queue between one producer and the bulk sink.
///
/// The queue exclusively owns its batch buffer and in-flight bookkeeping;
/// no other component mutates either.
pub struct IndexQueue {
    inner: Arc<Mutex<QueueInner>>,
    shared: Arc<QueueShared>,
}

impl IndexQueue {
    pub fn new(
        target_index: &str,
        cfg: QueueConfig,
        sink: Arc<dyn BulkSink>,
        emitter: BusEmitter,
        gate: BackpressureGate,
    ) -> Self {
        let inner = QueueInner {
            buffer: BulkBuffer::new(target_index, cfg.replay_actions),
            pending: VecDeque::new(),
            buffered_bytes: 0,
            in_flight: 0,
            controller: ConcurrencyController::new(&cfg),
            paused: false,
            finishing: false,
            failed: None,
            docs_submitted: 0,
            docs_flushed: 0,
            batches_flushed: 0,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            shared: Arc::new(QueueShared {
                sink,
                emitter,
                gate,
                cfg,
                drained: tokio::sync::Notify::new(),
                started: Instant::now(),
            }),
        }
    }

    /// Append one document to the current batch, sealing and dispatching it
    /// when a flush threshold is reached.
    ///
    /// After a sink failure the queue is winding down; further documents are
    /// dropped silently (the producer learns about the failure through
    /// [`is_failed`](Self::is_failed) or the run outcome). Calling `add`
    /// after [`finish`](Self::finish) is a [`ProtocolError`].
    pub fn add(&self, doc: Document) -> Result<(), ProtocolError> {
        let mut inner = self.lock();
        if inner.finishing {
            return Err(ProtocolError::AddAfterFinish);
        }
        if inner.failed.is_some() {
            return Ok(());
        }

        inner.docs_submitted += 1;
        let grown = inner.buffer.push(doc);
        inner.buffered_bytes += grown;

        if inner
            .buffer
            .should_flush(self.shared.cfg.flush_docs, self.shared.cfg.flush_bytes)
        {
            let batch = inner.buffer.seal();
            inner.pending.push_back(batch);
            Self::dispatch(&mut inner, &self.inner, &self.shared);
        }
        Self::update_watermarks(&mut inner, &self.shared);
        Ok(())
    }

    /// Flush the trailing partial batch, wait for every in-flight write to
    /// resolve, and report the final counters, or the first sink failure
    /// once in-flight writes have settled.
    pub async fn finish(&self) -> Result<QueueStats, SinkError> {
        {
            let mut inner = self.lock();
            inner.finishing = true;
            if !inner.buffer.is_empty() && inner.failed.is_none() {
                let batch = inner.buffer.seal();
                inner.pending.push_back(batch);
            }
            Self::dispatch(&mut inner, &self.inner, &self.shared);
        }

        self.wait_drained().await;

        let inner = self.lock();
        match inner.failed.clone() {
            Some(err) => Err(err),
            None => Ok(QueueStats {
                docs_submitted: inner.docs_submitted,
                docs_flushed: inner.docs_flushed,
                batches: inner.batches_flushed,
                elapsed: self.shared.started.elapsed(),
            }),
        }
    }

    /// Stop accepting and dispatching work, discard buffered batches, and
    /// wait for already in-flight writes to resolve. Used when the run is
    /// failing for reasons outside the queue.
    pub async fn shutdown(&self) -> Option<SinkError> {
        {
            let mut inner = self.lock();
            inner.finishing = true;
            let discarded: usize = inner.pending.iter().map(Batch::bytes).sum();
            inner.pending.clear();
            inner.buffered_bytes = inner.buffered_bytes.saturating_sub(discarded);
            inner.buffered_bytes = inner.buffered_bytes.saturating_sub(inner.buffer.bytes());
            inner.buffer.clear();
        }
        self.wait_drained().await;
        self.lock().failed.clone()
    }

    /// Whether a sink failure has been recorded.
    pub fn is_failed(&self) -> bool {
        self.lock().failed.is_some()
    }

    pub fn state(&self) -> QueueState {
        let inner = self.lock();
        QueueState {
            buffered_bytes: inner.buffered_bytes,
            in_flight: inner.in_flight,
            max_in_flight: inner.controller.bound(),
            pending_batches: inner.pending.len(),
            paused: inner.paused,
            recent_latencies: inner.controller.recent_latencies(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().expect("queue state poisoned")
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let inner = self.lock();
                if inner.in_flight == 0 && inner.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Hand pending batches to the sink while in-flight slots are free.
    fn dispatch(
        inner: &mut QueueInner,
        inner_arc: &Arc<Mutex<QueueInner>>,
        shared: &Arc<QueueShared>,
    ) {
        while inner.failed.is_none()
            && inner.in_flight < inner.controller.bound()
            && let Some(batch) = inner.pending.pop_front()
        {
            inner.buffered_bytes = inner.buffered_bytes.saturating_sub(batch.bytes());
            inner.in_flight += 1;
            let _ = shared.emitter.emit(PipelineEvent::depth(
                inner.buffered_bytes,
                inner.in_flight,
                inner.pending.len(),
            ));

            let inner_arc = Arc::clone(inner_arc);
            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                let outcome = shared.sink.write(batch).await;
                Self::complete_write(&inner_arc, &shared, outcome);
            });
        }
    }

    fn complete_write(
        inner_arc: &Arc<Mutex<QueueInner>>,
        shared: &Arc<QueueShared>,
        outcome: WriteOutcome,
    ) {
        let mut inner = inner_arc.lock().expect("queue state poisoned");
        inner.in_flight -= 1;

        match outcome {
            WriteOutcome::Success { docs, elapsed } => {
                inner.docs_flushed += docs as u64;
                inner.batches_flushed += 1;
                if let Some(bound) = inner.controller.record(elapsed) {
                    tracing::debug!(bound, "adjusted in-flight batch bound");
                }
                let _ = shared.emitter.emit(PipelineEvent::indexed(docs, elapsed));
                let secs = shared.started.elapsed().as_secs_f64();
                let rate = if secs > 0.0 {
                    inner.docs_flushed as f64 / secs
                } else {
                    0.0
                };
                let _ = shared
                    .emitter
                    .emit(PipelineEvent::progress(inner.docs_flushed, rate));
            }
            WriteOutcome::Failure(err) => {
                tracing::warn!(error = %err, "bulk write failed; draining queue");
                if inner.failed.is_none() {
                    inner.failed = Some(err);
                }
                // Undispatched work is discarded; in-flight writes run on.
                let discarded: usize = inner.pending.iter().map(Batch::bytes).sum();
                inner.pending.clear();
                inner.buffered_bytes = inner.buffered_bytes.saturating_sub(discarded);
                inner.buffered_bytes = inner.buffered_bytes.saturating_sub(inner.buffer.bytes());
                inner.buffer.clear();
                // Release a paused producer so it can observe the failure.
                inner.paused = false;
                shared.gate.resume();
            }
        }

        if inner.failed.is_none() {
            Self::dispatch(&mut inner, inner_arc, shared);
            Self::update_watermarks(&mut inner, shared);
        }

        if inner.in_flight == 0 && inner.pending.is_empty() {
            shared.drained.notify_waiters();
        }
    }

    /// Emit `pause` on crossing the high-water mark and `resume` on draining
    /// below the low-water mark; the `paused` flag keeps the pair from ever
    /// firing redundantly.
    fn update_watermarks(inner: &mut QueueInner, shared: &Arc<QueueShared>) {
        if !inner.paused && inner.buffered_bytes > shared.cfg.high_water_bytes {
            inner.paused = true;
            shared.gate.pause();
            let _ = shared
                .emitter
                .emit(PipelineEvent::paused(inner.buffered_bytes));
        } else if inner.paused && inner.buffered_bytes < shared.cfg.low_water_bytes {
            inner.paused = false;
            shared.gate.resume();
            let _ = shared
                .emitter
                .emit(PipelineEvent::resumed(inner.buffered_bytes));
        }
    }
}
