//! The orchestrator: wires source, transform, queue, and sink together and
//! drives one run to completion.
//!
//! A run walks `Idle → Preparing → Running → Draining → {Done | Failed}`.
//! Whatever happens, including a source that fails before producing a
//! single document, exactly one of `Finished`/`Error` is emitted on the
//! aggregated event channel, and in-flight bulk writes are always allowed
//! to settle before a failure surfaces.

use miette::Diagnostic;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use super::builder::PipelineBuilder;
use super::control::{BackpressureGate, RunPhase};
use crate::config::{ConfigError, PipelineConfig, QueueConfig, SourceSpec};
use crate::decode::DecoderRegistry;
use crate::event_bus::{ErrorKind, EventBus, EventEmitter, EventStream, PipelineEvent};
use crate::queue::{IndexQueue, ProtocolError};
use crate::sink::{BulkSink, PrepareError, SinkError, TargetPreparer};
use crate::source::{
    DocumentSource, FileSource, RemoteIndexSource, SearchClient, SourceError, StreamSource,
};
use crate::transform::{self, Transform, TransformContext};

/// A run-level failure. Record-level problems (malformed records, transform
/// rejections) never appear here; they are dropped and logged where they
/// happen.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(code(docflux::pipeline::config))]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(docflux::pipeline::prepare))]
    Prepare(#[from] PrepareError),

    #[error(transparent)]
    #[diagnostic(code(docflux::pipeline::source))]
    Source(#[from] SourceError),

    #[error(transparent)]
    #[diagnostic(code(docflux::pipeline::sink))]
    Sink(#[from] SinkError),

    #[error(transparent)]
    #[diagnostic(code(docflux::pipeline::protocol))]
    Protocol(#[from] ProtocolError),
}

/// Counters reported by a successful run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Records pulled from the source (before transform fan-out/skip).
    pub docs_read: u64,
    /// Documents acknowledged by the sink.
    pub docs_indexed: u64,
    pub batches: u64,
    pub elapsed: Duration,
}

enum PumpOutcome {
    Exhausted,
    SourceFailed(SourceError),
    SinkFailed,
    Protocol(ProtocolError),
}

/// One configured ingestion run.
///
/// Construct through [`Pipeline::builder`], subscribe to events with
/// [`subscribe`](Self::subscribe) if desired, then call
/// [`run`](Self::run), which consumes the pipeline. A `Pipeline` is one
/// run, not a reusable handle.
pub struct Pipeline {
    run_id: Uuid,
    target_index: String,
    recreate_target: bool,
    source_spec: Option<SourceSpec>,
    skip_header: bool,
    queue_cfg: QueueConfig,
    transform: Option<Transform>,
    decoders: DecoderRegistry,
    sink: Arc<dyn BulkSink>,
    search: Option<Arc<dyn SearchClient>>,
    preparer: Option<Arc<dyn TargetPreparer>>,
    event_bus: EventBus,
    gate: BackpressureGate,
    phase: RunPhase,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("run_id", &self.run_id)
            .field("target_index", &self.target_index)
            .field("source", &self.source_spec)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn assemble(
        config: PipelineConfig,
        transform: Option<Transform>,
        decoders: DecoderRegistry,
        sink: Arc<dyn BulkSink>,
        search: Option<Arc<dyn SearchClient>>,
        preparer: Option<Arc<dyn TargetPreparer>>,
    ) -> Self {
        let event_bus = config.event_bus.build_event_bus();
        event_bus.listen_for_events();
        Self {
            run_id: Uuid::new_v4(),
            target_index: config.target_index,
            recreate_target: config.recreate_target,
            source_spec: Some(config.source),
            skip_header: config.skip_header,
            queue_cfg: config.queue,
            transform,
            decoders,
            sink,
            search,
            preparer,
            event_bus,
            gate: BackpressureGate::new(),
            phase: RunPhase::Idle,
        }
    }

    /// Subscribe to the run's aggregated event channel. Call before
    /// [`run`](Self::run); the stream ends shortly after the terminal
    /// event once the pipeline is dropped.
    pub fn subscribe(&self) -> EventStream {
        self.event_bus.subscribe()
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Drive the run to completion.
    #[instrument(skip(self), fields(run_id = %self.run_id, target = %self.target_index))]
    pub async fn run(mut self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        tracing::info!(source = ?self.source_spec, "pipeline run started");

        self.phase = RunPhase::Preparing;
        if let Some(preparer) = self.preparer.clone() {
            if let Err(err) = preparer
                .prepare(&self.target_index, self.recreate_target)
                .await
            {
                return self.fail(ErrorKind::Prepare, err.into()).await;
            }
        }

        self.phase = RunPhase::Running;
        let mut source = match self.open_source().await {
            Ok(source) => source,
            Err(err) => return self.fail(ErrorKind::SourceIo, err.into()).await,
        };

        let queue = IndexQueue::new(
            &self.target_index,
            self.queue_cfg.clone(),
            Arc::clone(&self.sink),
            self.event_bus.get_emitter(),
            self.gate.clone(),
        );

        let mut docs_read = 0u64;
        let outcome = self.pump(source.as_mut(), &queue, &mut docs_read).await;
        source.close().await;

        match outcome {
            PumpOutcome::Exhausted => {
                self.phase = RunPhase::Draining;
                tracing::debug!(docs_read, "source exhausted; draining queue");
                match queue.finish().await {
                    Ok(stats) => {
                        self.phase = RunPhase::Done;
                        let _ = self
                            .event_bus
                            .get_emitter()
                            .emit(PipelineEvent::finished(stats.docs_flushed));
                        self.event_bus.stop_listener().await;
                        tracing::info!(
                            docs_read,
                            docs_indexed = stats.docs_flushed,
                            batches = stats.batches,
                            "pipeline run completed"
                        );
                        Ok(RunSummary {
                            run_id: self.run_id,
                            docs_read,
                            docs_indexed: stats.docs_flushed,
                            batches: stats.batches,
                            elapsed: started.elapsed(),
                        })
                    }
                    Err(err) => self.fail(ErrorKind::SinkWrite, err.into()).await,
                }
            }
            PumpOutcome::SinkFailed => {
                let err = queue
                    .shutdown()
                    .await
                    .unwrap_or_else(|| SinkError::transport("bulk write failed"));
                self.fail(ErrorKind::SinkWrite, err.into()).await
            }
            PumpOutcome::SourceFailed(err) => {
                queue.shutdown().await;
                self.fail(ErrorKind::SourceIo, err.into()).await
            }
            PumpOutcome::Protocol(err) => {
                queue.shutdown().await;
                self.fail(ErrorKind::Protocol, err.into()).await
            }
        }
    }

    /// Decode → transform → enqueue, strictly in input order, yielding to
    /// the backpressure gate before each pull.
    async fn pump(
        &self,
        source: &mut dyn DocumentSource,
        queue: &IndexQueue,
        docs_read: &mut u64,
    ) -> PumpOutcome {
        loop {
            self.gate.ready().await;
            if queue.is_failed() {
                return PumpOutcome::SinkFailed;
            }
            match source.next_record().await {
                Ok(Some(record)) => {
                    *docs_read += 1;
                    let ctx = TransformContext {
                        origin: record.origin,
                    };
                    for doc in transform::apply(self.transform.as_ref(), record.doc, &ctx) {
                        if let Err(err) = queue.add(doc) {
                            return PumpOutcome::Protocol(err);
                        }
                    }
                }
                Ok(None) => return PumpOutcome::Exhausted,
                Err(err) => return PumpOutcome::SourceFailed(err),
            }
        }
    }

    async fn open_source(&mut self) -> Result<Box<dyn DocumentSource>, SourceError> {
        let spec = self
            .source_spec
            .take()
            .expect("run() consumes the pipeline; the source spec is present");
        match spec {
            SourceSpec::File {
                pattern,
                format,
                options,
            } => {
                let decoder = self
                    .decoders
                    .get(format)
                    .expect("decoder presence validated at build");
                Ok(Box::new(FileSource::new(
                    &pattern,
                    decoder,
                    options,
                    self.skip_header,
                )?))
            }
            SourceSpec::Stream {
                reader,
                format,
                options,
            } => {
                let decoder = self
                    .decoders
                    .get(format)
                    .expect("decoder presence validated at build");
                Ok(Box::new(
                    StreamSource::open(reader, decoder, &options, self.skip_header).await?,
                ))
            }
            SourceSpec::RemoteIndex {
                index,
                filter,
                page_size,
                populated_fields_only,
            } => {
                let client = self
                    .search
                    .clone()
                    .expect("search client presence validated at build");
                Ok(Box::new(RemoteIndexSource::new(
                    client,
                    index,
                    filter,
                    page_size,
                    populated_fields_only,
                )))
            }
        }
    }

    async fn fail(
        &mut self,
        kind: ErrorKind,
        err: PipelineError,
    ) -> Result<RunSummary, PipelineError> {
        self.phase = RunPhase::Failed;
        tracing::error!(kind = kind.label(), error = %err, "pipeline run failed");
        let _ = self
            .event_bus
            .get_emitter()
            .emit(PipelineEvent::error(kind, err.to_string()));
        self.event_bus.stop_listener().await;
        Err(err)
    }
}
