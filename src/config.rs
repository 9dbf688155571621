//! Run configuration: flush thresholds, watermarks, concurrency policy,
//! source descriptors, and the event bus wiring.
//!
//! Everything here is validated synchronously by
//! [`PipelineBuilder::build`](crate::pipeline::PipelineBuilder::build),
//! before any I/O happens.

use miette::Diagnostic;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::decode::{ByteReader, DecoderOptions, SourceFormat};
use crate::event_bus::{EventBus, MemorySink, StdOutSink};

/// Default flush threshold in KiB. In earlier incarnations of this tool the
/// buffer size was a document count; it now translates to flushed bytes, and
/// for backwards compatibility with those old values it is expressed in
/// KiB and multiplied by 1024 where it is consumed.
pub const DEFAULT_FLUSH_KBYTES: usize = 5120;

/// Default flush threshold in documents.
pub const DEFAULT_FLUSH_DOCS: usize = 1000;

/// Default number of documents fetched per page when reading a remote index.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Default bound on concurrently in-flight batches.
pub const DEFAULT_IN_FLIGHT: usize = 5;

/// Ceiling the adaptive policy may grow the in-flight bound to.
pub const DEFAULT_IN_FLIGHT_CEILING: usize = 10;

/// Samples required before the adaptive policy may adjust the bound.
pub const DEFAULT_LATENCY_WINDOW: usize = 8;

/// Concurrency policy for in-flight batches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Concurrency {
    /// A fixed in-flight bound; no adaptation.
    Fixed(usize),
    /// Start at [`DEFAULT_IN_FLIGHT`] and adapt on batch latency within
    /// `[1, DEFAULT_IN_FLIGHT_CEILING]`.
    Auto,
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::Auto
    }
}

/// Flow-controller tuning.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Seal the current batch once its estimated bytes reach this.
    pub flush_bytes: usize,
    /// Seal the current batch once it holds this many documents.
    pub flush_docs: usize,
    /// Emit `pause` when buffered-but-undispatched bytes exceed this.
    pub high_water_bytes: usize,
    /// Emit `resume` once buffered bytes drain below this.
    pub low_water_bytes: usize,
    pub concurrency: Concurrency,
    /// Latency samples required before an adaptive adjustment.
    pub latency_window: usize,
    /// Average latency below this grows the in-flight bound.
    pub fast_threshold: Duration,
    /// Average latency above this shrinks the in-flight bound.
    pub slow_threshold: Duration,
    /// The input is an already-paired action+document bulk stream (for
    /// example a replayed queue dump); do not synthesize action headers.
    pub replay_actions: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let flush_bytes = Self::resolve_flush_bytes(None);
        Self {
            flush_bytes,
            flush_docs: DEFAULT_FLUSH_DOCS,
            high_water_bytes: flush_bytes * 4,
            low_water_bytes: flush_bytes,
            concurrency: Concurrency::default(),
            latency_window: DEFAULT_LATENCY_WINDOW,
            fast_threshold: Duration::from_millis(300),
            slow_threshold: Duration::from_secs(2),
            replay_actions: false,
        }
    }
}

impl QueueConfig {
    /// Resolve the flush threshold, preferring an explicit value, then the
    /// `DOCFLUX_FLUSH_KBYTES` environment variable, then the default.
    fn resolve_flush_bytes(provided: Option<usize>) -> usize {
        if let Some(bytes) = provided {
            return bytes;
        }
        dotenvy::dotenv().ok();
        let kbytes = std::env::var("DOCFLUX_FLUSH_KBYTES")
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(DEFAULT_FLUSH_KBYTES);
        kbytes * 1024
    }

    #[must_use]
    pub fn with_flush_bytes(mut self, flush_bytes: usize) -> Self {
        self.flush_bytes = flush_bytes;
        self
    }

    #[must_use]
    pub fn with_flush_docs(mut self, flush_docs: usize) -> Self {
        self.flush_docs = flush_docs;
        self
    }

    #[must_use]
    pub fn with_watermarks(mut self, high: usize, low: usize) -> Self {
        self.high_water_bytes = high;
        self.low_water_bytes = low;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Where documents come from. A pipeline run has exactly one of these; the
/// enum makes a second descriptor unrepresentable past `build()`.
pub enum SourceSpec {
    /// Glob over local files, decoded sequentially in sorted order.
    File {
        pattern: String,
        format: SourceFormat,
        options: DecoderOptions,
    },
    /// A caller-supplied byte channel, consumed exactly once.
    Stream {
        reader: ByteReader,
        format: SourceFormat,
        options: DecoderOptions,
    },
    /// Paginated retrieval from a remote index via a scroll cursor.
    RemoteIndex {
        index: String,
        filter: Option<Value>,
        page_size: usize,
        populated_fields_only: bool,
    },
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::File {
                pattern, format, ..
            } => f
                .debug_struct("File")
                .field("pattern", pattern)
                .field("format", format)
                .finish_non_exhaustive(),
            SourceSpec::Stream { format, .. } => f
                .debug_struct("Stream")
                .field("format", format)
                .finish_non_exhaustive(),
            SourceSpec::RemoteIndex {
                index,
                page_size,
                populated_fields_only,
                ..
            } => f
                .debug_struct("RemoteIndex")
                .field("index", index)
                .field("page_size", page_size)
                .field("populated_fields_only", populated_fields_only)
                .finish_non_exhaustive(),
        }
    }
}

/// Validated configuration for one pipeline run.
#[derive(Debug)]
pub struct PipelineConfig {
    pub target_index: String,
    pub recreate_target: bool,
    pub source: SourceSpec,
    /// Drop the first well-formed record of the first consumed unit (the
    /// first file in the sorted glob expansion, or the stream itself).
    /// Strips a header row; it never applies per-file.
    pub skip_header: bool,
    pub queue: QueueConfig,
    pub event_bus: EventBusConfig,
}

/// Which built-in sinks the run's event bus broadcasts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkConfig {
    StdOut,
    Memory,
}

/// Event bus wiring for a run.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    pub sinks: Vec<SinkConfig>,
}

impl EventBusConfig {
    #[must_use]
    pub fn with_stdout_only() -> Self {
        Self {
            sinks: vec![SinkConfig::StdOut],
        }
    }

    /// No built-in sinks; events reach subscribers only.
    #[must_use]
    pub fn silent() -> Self {
        Self { sinks: Vec::new() }
    }

    #[must_use]
    pub fn add_sink(mut self, sink: SinkConfig) -> Self {
        if !self.sinks.contains(&sink) {
            self.sinks.push(sink);
        }
        self
    }

    pub fn build_event_bus(&self) -> EventBus {
        let sinks = self
            .sinks
            .iter()
            .map(|sink| -> Box<dyn crate::event_bus::EventSink> {
                match sink {
                    SinkConfig::StdOut => Box::new(StdOutSink::default()),
                    SinkConfig::Memory => Box::new(MemorySink::new()),
                }
            })
            .collect();
        EventBus::with_sinks(sinks)
    }
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self::with_stdout_only()
    }
}

/// Configuration rejected before any I/O.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("target index is required")]
    #[diagnostic(code(docflux::config::missing_target))]
    MissingTarget,

    #[error("no source configured; supply exactly one of file, stream, or remote index")]
    #[diagnostic(code(docflux::config::missing_source))]
    MissingSource,

    #[error("{count} sources configured; a run reads from exactly one")]
    #[diagnostic(code(docflux::config::multiple_sources))]
    MultipleSources { count: usize },

    #[error("no bulk sink supplied")]
    #[diagnostic(code(docflux::config::missing_sink))]
    MissingSink,

    #[error("no decoder registered for format {format}")]
    #[diagnostic(
        code(docflux::config::missing_decoder),
        help("register one with PipelineBuilder::register_decoder")
    )]
    MissingDecoder { format: SourceFormat },

    #[error("remote index source requires a search client")]
    #[diagnostic(code(docflux::config::missing_search_client))]
    MissingSearchClient,

    #[error("invalid flow thresholds: {detail}")]
    #[diagnostic(code(docflux::config::invalid_thresholds))]
    InvalidThresholds { detail: String },

    #[error("page size must be greater than zero")]
    #[diagnostic(code(docflux::config::invalid_page_size))]
    InvalidPageSize,
}
