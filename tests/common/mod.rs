//! Shared fixtures: reference decoders, scripted collaborators, and event
//! helpers used across the integration suites.

#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use docflux::config::EventBusConfig;
use docflux::decode::{ByteReader, DecodeError, DecoderOptions, FormatDecoder, RecordStream};
use docflux::document::Document;
use docflux::event_bus::{EventStream, PipelineEvent};
use docflux::queue::Batch;
use docflux::sink::{BulkSink, PrepareError, SinkError, TargetPreparer, WriteOutcome};
use docflux::source::{ScrollPage, ScrollRequest, ScrollToken, SearchClient, SearchError};

/// Event bus wiring that keeps test output clean.
pub fn quiet() -> EventBusConfig {
    EventBusConfig::silent()
}

/// Wrap a string in a byte reader, as callers hand streams to the pipeline.
pub fn byte_reader(content: &str) -> ByteReader {
    Box::new(std::io::Cursor::new(content.as_bytes().to_vec()))
}

/// Drain events until (and including) the terminal one.
pub async fn collect_events(mut stream: EventStream) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.next_timeout(Duration::from_secs(5)).await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    events
}

pub fn terminal_count(events: &[PipelineEvent]) -> usize {
    events.iter().filter(|event| event.is_terminal()).count()
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

/// Line-delimited JSON decoder used as the reference format in tests.
pub struct NdJsonDecoder;

struct NdJsonStream {
    reader: BufReader<ByteReader>,
    line: String,
}

#[async_trait]
impl RecordStream for NdJsonStream {
    async fn next_record(&mut self) -> Option<Result<Document, DecodeError>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line).await {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(
                        serde_json::from_str::<Value>(trimmed)
                            .map(Document::new)
                            .map_err(|err| DecodeError::malformed(err.to_string())),
                    );
                }
                Err(err) => return Some(Err(DecodeError::Io(err))),
            }
        }
    }
}

#[async_trait]
impl FormatDecoder for NdJsonDecoder {
    async fn open(
        &self,
        input: ByteReader,
        _options: &DecoderOptions,
    ) -> Result<Box<dyn RecordStream>, DecodeError> {
        Ok(Box::new(NdJsonStream {
            reader: BufReader::new(input),
            line: String::new(),
        }))
    }
}

/// Minimal delimited-text decoder: the first line names the columns, every
/// later line becomes a document of string fields.
pub struct CsvDecoder;

struct CsvStream {
    reader: BufReader<ByteReader>,
    line: String,
    columns: Vec<String>,
    delimiter: char,
}

#[async_trait]
impl RecordStream for CsvStream {
    async fn next_record(&mut self) -> Option<Result<Document, DecodeError>> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line).await {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = self.line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    let values: Vec<&str> = trimmed.split(self.delimiter).collect();
                    if values.len() != self.columns.len() {
                        return Some(Err(DecodeError::malformed(format!(
                            "expected {} fields, got {}",
                            self.columns.len(),
                            values.len()
                        ))));
                    }
                    let mut object = serde_json::Map::new();
                    for (column, value) in self.columns.iter().zip(values) {
                        object.insert(column.clone(), Value::String(value.to_string()));
                    }
                    return Some(Ok(Document::new(Value::Object(object))));
                }
                Err(err) => return Some(Err(DecodeError::Io(err))),
            }
        }
    }
}

#[async_trait]
impl FormatDecoder for CsvDecoder {
    async fn open(
        &self,
        input: ByteReader,
        options: &DecoderOptions,
    ) -> Result<Box<dyn RecordStream>, DecodeError> {
        let delimiter = options
            .get("delimiter")
            .and_then(Value::as_str)
            .and_then(|raw| raw.chars().next())
            .unwrap_or(',');
        let mut reader = BufReader::new(input);
        let mut header = String::new();
        reader.read_line(&mut header).await?;
        let columns: Vec<String> = header
            .trim()
            .split(delimiter)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Box::new(CsvStream {
            reader,
            line: String::new(),
            columns,
            delimiter,
        }))
    }
}

/// A byte reader that fails on the first read, standing in for a torn-down
/// upstream channel.
pub struct FailingReader;

impl tokio::io::AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "upstream channel torn down",
        )))
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Records every batch it is handed and acknowledges them all.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<RecordingInner>,
}

#[derive(Default)]
struct RecordingInner {
    batches: Mutex<Vec<Batch>>,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a slow store; every write sleeps this long.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(RecordingInner {
                batches: Mutex::new(Vec::new()),
                delay: Some(delay),
            }),
        }
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.inner.batches.lock().unwrap().clone()
    }

    pub fn docs(&self) -> usize {
        self.batches().iter().map(Batch::docs).sum()
    }

    /// Document payloads in write order, with synthesized action headers
    /// stripped.
    pub fn documents(&self) -> Vec<Value> {
        self.batches()
            .iter()
            .flat_map(|batch| {
                batch
                    .lines()
                    .chunks(2)
                    .filter_map(|pair| pair.get(1).cloned())
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[async_trait]
impl BulkSink for RecordingSink {
    async fn write(&self, batch: Batch) -> WriteOutcome {
        let elapsed = self.inner.delay.unwrap_or(Duration::from_millis(1));
        if let Some(delay) = self.inner.delay {
            tokio::time::sleep(delay).await;
        }
        let docs = batch.docs();
        self.inner.batches.lock().unwrap().push(batch);
        WriteOutcome::Success { docs, elapsed }
    }
}

/// Fails exactly one write (the `fail_on`-th call, 1-based) and succeeds on
/// every other.
#[derive(Clone)]
pub struct FailingSink {
    inner: Arc<FailingInner>,
}

struct FailingInner {
    fail_on: usize,
    calls: AtomicUsize,
    completed: AtomicUsize,
    delay: Option<Duration>,
}

impl FailingSink {
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: Arc::new(FailingInner {
                fail_on,
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                delay: None,
            }),
        }
    }

    pub fn with_delay(fail_on: usize, delay: Duration) -> Self {
        Self {
            inner: Arc::new(FailingInner {
                fail_on,
                calls: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                delay: Some(delay),
            }),
        }
    }

    /// Writes issued to the sink.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Writes that ran to completion (success or failure).
    pub fn completed(&self) -> usize {
        self.inner.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkSink for FailingSink {
    async fn write(&self, batch: Batch) -> WriteOutcome {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.inner.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.completed.fetch_add(1, Ordering::SeqCst);
        if call == self.inner.fail_on {
            WriteOutcome::Failure(SinkError::rejected(format!("batch {call} rejected")))
        } else {
            WriteOutcome::Success {
                docs: batch.docs(),
                elapsed: self.inner.delay.unwrap_or(Duration::from_millis(1)),
            }
        }
    }
}

/// Acknowledges every write while tracking how many ran concurrently.
#[derive(Clone)]
pub struct GaugeSink {
    inner: Arc<GaugeInner>,
}

struct GaugeInner {
    current: AtomicUsize,
    max: AtomicUsize,
    delay: Duration,
}

impl GaugeSink {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(GaugeInner {
                current: AtomicUsize::new(0),
                max: AtomicUsize::new(0),
                delay,
            }),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BulkSink for GaugeSink {
    async fn write(&self, batch: Batch) -> WriteOutcome {
        let current = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.inner.delay).await;
        self.inner.current.fetch_sub(1, Ordering::SeqCst);
        WriteOutcome::Success {
            docs: batch.docs(),
            elapsed: self.inner.delay,
        }
    }
}

// ---------------------------------------------------------------------------
// Remote search
// ---------------------------------------------------------------------------

/// Serves a fixed corpus through the scroll protocol and records how it was
/// queried.
#[derive(Clone)]
pub struct ScriptedSearchClient {
    inner: Arc<ScriptedInner>,
}

struct ScriptedInner {
    corpus: Vec<Document>,
    sample_docs: Vec<Document>,
    fail_sample: bool,
    page_size: Mutex<usize>,
    projection: Mutex<Option<Vec<String>>>,
    scroll_requests: AtomicUsize,
    sample_requests: AtomicUsize,
    cleared: Mutex<Vec<ScrollToken>>,
}

impl ScriptedSearchClient {
    fn build(corpus: Vec<Document>, sample_docs: Vec<Document>, fail_sample: bool) -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                corpus,
                sample_docs,
                fail_sample,
                page_size: Mutex::new(0),
                projection: Mutex::new(None),
                scroll_requests: AtomicUsize::new(0),
                sample_requests: AtomicUsize::new(0),
                cleared: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn new(corpus: Vec<Document>) -> Self {
        Self::build(corpus, Vec::new(), false)
    }

    pub fn with_sample(corpus: Vec<Document>, sample_docs: Vec<Document>) -> Self {
        Self::build(corpus, sample_docs, false)
    }

    pub fn with_failing_sample(corpus: Vec<Document>) -> Self {
        Self::build(corpus, Vec::new(), true)
    }

    /// Scroll requests issued (the opening search plus every continuation).
    pub fn scroll_requests(&self) -> usize {
        self.inner.scroll_requests.load(Ordering::SeqCst)
    }

    pub fn sample_requests(&self) -> usize {
        self.inner.sample_requests.load(Ordering::SeqCst)
    }

    /// The `_source` projection the main pass was opened with.
    pub fn captured_projection(&self) -> Option<Vec<String>> {
        self.inner.projection.lock().unwrap().clone()
    }

    pub fn cleared_tokens(&self) -> Vec<ScrollToken> {
        self.inner.cleared.lock().unwrap().clone()
    }

    fn project(&self, doc: &Document) -> Document {
        let projection = self.inner.projection.lock().unwrap().clone();
        let Some(fields) = projection else {
            return doc.clone();
        };
        let Some(object) = doc.fields() else {
            return doc.clone();
        };
        let filtered: serde_json::Map<String, Value> = object
            .iter()
            .filter(|(name, _)| fields.iter().any(|field| field == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Document::new(Value::Object(filtered))
    }

    fn page_at(&self, offset: usize) -> ScrollPage {
        let page_size = *self.inner.page_size.lock().unwrap();
        let end = (offset + page_size).min(self.inner.corpus.len());
        let hits = self.inner.corpus[offset..end]
            .iter()
            .map(|doc| self.project(doc))
            .collect();
        ScrollPage {
            token: format!("scroll-{end}"),
            total: self.inner.corpus.len() as u64,
            hits,
        }
    }
}

#[async_trait]
impl SearchClient for ScriptedSearchClient {
    async fn open_scroll(&self, request: &ScrollRequest) -> Result<ScrollPage, SearchError> {
        self.inner.scroll_requests.fetch_add(1, Ordering::SeqCst);
        *self.inner.page_size.lock().unwrap() = request.page_size;
        *self.inner.projection.lock().unwrap() = request.projection.clone();
        Ok(self.page_at(0))
    }

    async fn continue_scroll(&self, token: &ScrollToken) -> Result<ScrollPage, SearchError> {
        self.inner.scroll_requests.fetch_add(1, Ordering::SeqCst);
        let offset: usize = token
            .strip_prefix("scroll-")
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| SearchError::scroll(format!("unknown token {token}")))?;
        Ok(self.page_at(offset))
    }

    async fn sample(&self, request: &ScrollRequest) -> Result<Vec<Document>, SearchError> {
        self.inner.sample_requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_sample {
            return Err(SearchError::request("random-score sampling unsupported"));
        }
        if self.inner.sample_docs.is_empty() {
            Ok(self
                .inner
                .corpus
                .iter()
                .take(request.page_size)
                .cloned()
                .collect())
        } else {
            Ok(self.inner.sample_docs.clone())
        }
    }

    async fn clear_scroll(&self, token: &ScrollToken) -> Result<(), SearchError> {
        self.inner.cleared.lock().unwrap().push(token.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Preparers
// ---------------------------------------------------------------------------

/// Always refuses to prepare the target.
pub struct FailingPreparer;

#[async_trait]
impl TargetPreparer for FailingPreparer {
    async fn prepare(&self, target: &str, _recreate: bool) -> Result<(), PrepareError> {
        Err(PrepareError::msg(format!("cannot create mapping for {target}")))
    }
}

/// Succeeds and counts invocations.
#[derive(Clone, Default)]
pub struct CountingPreparer {
    calls: Arc<AtomicUsize>,
}

impl CountingPreparer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetPreparer for CountingPreparer {
    async fn prepare(&self, _target: &str, _recreate: bool) -> Result<(), PrepareError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
