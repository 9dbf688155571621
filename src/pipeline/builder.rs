//! Fluent construction and synchronous validation of a pipeline run.

use serde_json::Value;
use std::sync::Arc;

use super::runner::Pipeline;
use crate::config::{
    ConfigError, Concurrency, DEFAULT_PAGE_SIZE, EventBusConfig, PipelineConfig, QueueConfig,
    SourceSpec,
};
use crate::decode::{ByteReader, DecoderOptions, DecoderRegistry, FormatDecoder, SourceFormat};
use crate::document::Document;
use crate::sink::{BulkSink, TargetPreparer};
use crate::source::SearchClient;
use crate::transform::{Transform, TransformContext, TransformError, Transformed};

/// Builder for a [`Pipeline`].
///
/// All configuration errors (a missing target, zero or several sources,
/// a format without a registered decoder) surface synchronously from
/// [`build`](Self::build), before any I/O.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use docflux::pipeline::Pipeline;
/// # use docflux::decode::SourceFormat;
/// # fn collaborators() -> (Arc<dyn docflux::decode::FormatDecoder>, Arc<dyn docflux::sink::BulkSink>) { unimplemented!() }
/// let (decoder, sink) = collaborators();
/// let pipeline = Pipeline::builder()
///     .target_index("web-logs")
///     .file_source("logs/*.ndjson", SourceFormat::NdJson)
///     .register_decoder(SourceFormat::NdJson, decoder)
///     .bulk_sink(sink)
///     .build()
///     .expect("valid configuration");
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    target_index: Option<String>,
    recreate_target: bool,
    file_pattern: Option<String>,
    stream_reader: Option<ByteReader>,
    remote_index: Option<String>,
    format: Option<SourceFormat>,
    decoder_options: DecoderOptions,
    page_size: Option<usize>,
    query_filter: Option<Value>,
    populated_fields_only: bool,
    skip_header: bool,
    sources_configured: usize,
    transform: Option<Transform>,
    decoders: DecoderRegistry,
    sink: Option<Arc<dyn BulkSink>>,
    search: Option<Arc<dyn SearchClient>>,
    preparer: Option<Arc<dyn TargetPreparer>>,
    queue: QueueConfig,
    event_bus: EventBusConfig,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn target_index(mut self, target: impl Into<String>) -> Self {
        self.target_index = Some(target.into());
        self
    }

    /// Drop and recreate the target during the preparing phase.
    #[must_use]
    pub fn recreate_target(mut self, recreate: bool) -> Self {
        self.recreate_target = recreate;
        self
    }

    /// Read from local files matching a glob pattern.
    #[must_use]
    pub fn file_source(mut self, pattern: impl Into<String>, format: SourceFormat) -> Self {
        self.file_pattern = Some(pattern.into());
        self.format = Some(format);
        self.sources_configured += 1;
        self
    }

    /// Read from a caller-supplied byte channel.
    #[must_use]
    pub fn stream_source(mut self, reader: ByteReader, format: SourceFormat) -> Self {
        self.stream_reader = Some(reader);
        self.format = Some(format);
        self.sources_configured += 1;
        self
    }

    /// Read back out of a remote index via scroll pagination.
    #[must_use]
    pub fn remote_source(mut self, index: impl Into<String>) -> Self {
        self.remote_index = Some(index.into());
        self.sources_configured += 1;
        self
    }

    /// Format-specific decoder settings for the configured source.
    #[must_use]
    pub fn decoder_options(mut self, options: DecoderOptions) -> Self {
        self.decoder_options = options;
        self
    }

    /// Documents fetched per page of the remote source.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Structured filter applied to the remote source.
    #[must_use]
    pub fn query_filter(mut self, filter: Value) -> Self {
        self.query_filter = Some(filter);
        self
    }

    /// Sample the remote index first and restrict retrieval to the fields
    /// actually populated.
    #[must_use]
    pub fn populated_fields_only(mut self, enabled: bool) -> Self {
        self.populated_fields_only = enabled;
        self
    }

    /// Drop the first well-formed record of the first consumed unit (header
    /// row stripping).
    #[must_use]
    pub fn skip_header(mut self, enabled: bool) -> Self {
        self.skip_header = enabled;
        self
    }

    /// Declare the input an already-paired action+document bulk stream; the
    /// queue will not synthesize action headers.
    #[must_use]
    pub fn replay_actions(mut self, enabled: bool) -> Self {
        self.queue.replay_actions = enabled;
        self
    }

    /// Per-record transform applied between decode and enqueue.
    #[must_use]
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(&Document, &TransformContext) -> Result<Transformed, TransformError>
            + Send
            + Sync
            + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn register_decoder(mut self, format: SourceFormat, decoder: Arc<dyn FormatDecoder>) -> Self {
        self.decoders.register(format, decoder);
        self
    }

    #[must_use]
    pub fn bulk_sink(mut self, sink: Arc<dyn BulkSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn search_client(mut self, client: Arc<dyn SearchClient>) -> Self {
        self.search = Some(client);
        self
    }

    #[must_use]
    pub fn target_preparer(mut self, preparer: Arc<dyn TargetPreparer>) -> Self {
        self.preparer = Some(preparer);
        self
    }

    #[must_use]
    pub fn flush_bytes(mut self, flush_bytes: usize) -> Self {
        self.queue.flush_bytes = flush_bytes;
        self
    }

    #[must_use]
    pub fn flush_docs(mut self, flush_docs: usize) -> Self {
        self.queue.flush_docs = flush_docs;
        self
    }

    #[must_use]
    pub fn watermarks(mut self, high: usize, low: usize) -> Self {
        self.queue.high_water_bytes = high;
        self.queue.low_water_bytes = low;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: Concurrency) -> Self {
        self.queue.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn event_bus(mut self, event_bus: EventBusConfig) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Validate the configuration and assemble a run-ready [`Pipeline`].
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        let target_index = self.target_index.ok_or(ConfigError::MissingTarget)?;

        match self.sources_configured {
            0 => return Err(ConfigError::MissingSource),
            1 => {}
            count => return Err(ConfigError::MultipleSources { count }),
        }

        let sink = self.sink.ok_or(ConfigError::MissingSink)?;

        if self.queue.flush_docs == 0 || self.queue.flush_bytes == 0 {
            return Err(ConfigError::InvalidThresholds {
                detail: "flush thresholds must be greater than zero".into(),
            });
        }
        if self.queue.low_water_bytes >= self.queue.high_water_bytes {
            return Err(ConfigError::InvalidThresholds {
                detail: "low-water mark must sit below the high-water mark".into(),
            });
        }

        let source = if let Some(pattern) = self.file_pattern {
            let format = self.format.expect("file source always records a format");
            if !self.decoders.contains(format) {
                return Err(ConfigError::MissingDecoder { format });
            }
            SourceSpec::File {
                pattern,
                format,
                options: self.decoder_options,
            }
        } else if let Some(reader) = self.stream_reader {
            let format = self.format.expect("stream source always records a format");
            if !self.decoders.contains(format) {
                return Err(ConfigError::MissingDecoder { format });
            }
            SourceSpec::Stream {
                reader,
                format,
                options: self.decoder_options,
            }
        } else {
            let index = self
                .remote_index
                .expect("exactly one source is configured at this point");
            if self.search.is_none() {
                return Err(ConfigError::MissingSearchClient);
            }
            let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
            if page_size == 0 {
                return Err(ConfigError::InvalidPageSize);
            }
            SourceSpec::RemoteIndex {
                index,
                filter: self.query_filter,
                page_size,
                populated_fields_only: self.populated_fields_only,
            }
        };

        let config = PipelineConfig {
            target_index,
            recreate_target: self.recreate_target,
            source,
            skip_header: self.skip_header,
            queue: self.queue,
            event_bus: self.event_bus,
        };

        Ok(Pipeline::assemble(
            config,
            self.transform,
            self.decoders,
            sink,
            self.search,
            self.preparer,
        ))
    }
}
