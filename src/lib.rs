//! # docflux: Streaming Document Ingestion Pipeline
//!
//! docflux moves structured records from one origin (local files, a
//! caller-supplied byte stream, or a paginated remote index) into a
//! bulk-indexed document store, optionally reshaping every record through a
//! user-supplied transform on the way.
//!
//! ## Core Concepts
//!
//! - **Sources**: origin-specific producers (file glob, byte stream, remote
//!   scroll) behind one [`DocumentSource`](source::DocumentSource) trait
//! - **Transform**: a per-record mapping that can rewrite, fan out, or skip
//! - **Flow controller**: batching with high/low water marks and a bounded,
//!   latency-adaptive number of in-flight bulk writes
//! - **Bulk sink**: the external batched-write interface to the store
//! - **Pipeline**: the orchestrator driving one run through
//!   `Preparing → Running → Draining → {Done | Failed}`
//!
//! Data flows strictly source → transform → queue → sink. Control flows the
//! other way: the queue pauses and resumes the producer through a per-run
//! backpressure gate, so two concurrent runs in one process can never throttle
//! each other.
//!
//! ## Quick Start
//!
//! Decoders and the bulk write are interface boundaries; bring an
//! implementation for the format you read and the store you write:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use docflux::decode::{
//!     ByteReader, DecodeError, DecoderOptions, FormatDecoder, RecordStream, SourceFormat,
//! };
//! use docflux::document::Document;
//! use docflux::pipeline::Pipeline;
//! use docflux::queue::Batch;
//! use docflux::sink::{BulkSink, WriteOutcome};
//! use docflux::transform::Transformed;
//!
//! struct JsonLines;
//!
//! struct JsonLineStream {
//!     reader: tokio::io::BufReader<ByteReader>,
//!     line: String,
//! }
//!
//! #[async_trait]
//! impl RecordStream for JsonLineStream {
//!     async fn next_record(&mut self) -> Option<Result<Document, DecodeError>> {
//!         use tokio::io::AsyncBufReadExt;
//!         self.line.clear();
//!         match self.reader.read_line(&mut self.line).await {
//!             Ok(0) => None,
//!             Ok(_) => Some(
//!                 serde_json::from_str::<serde_json::Value>(self.line.trim())
//!                     .map(Document::new)
//!                     .map_err(|err| DecodeError::malformed(err.to_string())),
//!             ),
//!             Err(err) => Some(Err(DecodeError::Io(err))),
//!         }
//!     }
//! }
//!
//! #[async_trait]
//! impl FormatDecoder for JsonLines {
//!     async fn open(
//!         &self,
//!         input: ByteReader,
//!         _options: &DecoderOptions,
//!     ) -> Result<Box<dyn RecordStream>, DecodeError> {
//!         Ok(Box::new(JsonLineStream {
//!             reader: tokio::io::BufReader::new(input),
//!             line: String::new(),
//!         }))
//!     }
//! }
//!
//! struct PrintlnSink;
//!
//! #[async_trait]
//! impl BulkSink for PrintlnSink {
//!     async fn write(&self, batch: Batch) -> WriteOutcome {
//!         println!("would bulk-write {} docs", batch.docs());
//!         WriteOutcome::Success {
//!             docs: batch.docs(),
//!             elapsed: Duration::from_millis(1),
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::builder()
//!         .target_index("web-logs")
//!         .file_source("logs/*.ndjson", SourceFormat::NdJson)
//!         .register_decoder(SourceFormat::NdJson, Arc::new(JsonLines))
//!         .bulk_sink(Arc::new(PrintlnSink))
//!         .transform(|doc, _ctx| {
//!             let mut value = doc.as_value().clone();
//!             value["ingested"] = serde_json::json!(true);
//!             Ok(Transformed::One(Document::new(value)))
//!         })
//!         .build()?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             eprintln!("{event}");
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("indexed {} docs", summary.docs_indexed);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`document`] - The record type flowing through the pipeline
//! - [`decode`] - Decoder interface boundary and format registry
//! - [`transform`] - Per-record transform stage
//! - [`source`] - File, stream, and remote-index producers
//! - [`queue`] - Flow-controlled batching and in-flight write bounds
//! - [`sink`] - Bulk write and target preparation boundaries
//! - [`pipeline`] - Builder, orchestrator, and backpressure control
//! - [`event_bus`] - Aggregated run events and subscriber streams
//! - [`config`] - Tuning knobs and their validation

pub mod config;
pub mod decode;
pub mod document;
pub mod event_bus;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod source;
pub mod telemetry;
pub mod transform;
