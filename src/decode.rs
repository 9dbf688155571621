//! The decoder boundary: how raw bytes become [`Document`]s.
//!
//! Format decoders are external collaborators. The pipeline consumes them
//! through [`FormatDecoder`]/[`RecordStream`] and never implements a wire
//! format itself; embedders register one decoder per [`SourceFormat`] they
//! intend to read.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::document::Document;

/// Raw byte input handed to a decoder. File sources pass a buffered file
/// reader; stream sources pass the caller-supplied channel as-is.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Free-form, format-specific decoder settings (delimiters, column types,
/// row-group hints). Opaque to the pipeline.
pub type DecoderOptions = FxHashMap<String, serde_json::Value>;

/// The input formats a pipeline run can be configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Line-delimited JSON, one document per line.
    NdJson,
    /// Delimited text with a leading header row.
    Csv,
    /// Columnar binary, Parquet layout.
    Parquet,
    /// Columnar binary, Arrow IPC layout.
    Arrow,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SourceFormat::NdJson => "ndjson",
            SourceFormat::Csv => "csv",
            SourceFormat::Parquet => "parquet",
            SourceFormat::Arrow => "arrow",
        };
        write!(f, "{label}")
    }
}

/// Errors produced while decoding.
///
/// The two variants have very different blast radii: a malformed record is
/// dropped and the stream continues, while an I/O failure is fatal for the
/// whole run.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record: {detail}")]
    Malformed { detail: String },

    #[error("decoder I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}

/// A stream of decoded documents pulled one record at a time.
///
/// `None` signals end of input. `Some(Err(DecodeError::Malformed { .. }))`
/// refers to exactly one record; callers drop it and keep pulling.
#[async_trait]
pub trait RecordStream: Send {
    async fn next_record(&mut self) -> Option<Result<Document, DecodeError>>;
}

/// Opens a [`RecordStream`] over raw bytes for one input format.
#[async_trait]
pub trait FormatDecoder: Send + Sync {
    async fn open(
        &self,
        input: ByteReader,
        options: &DecoderOptions,
    ) -> Result<Box<dyn RecordStream>, DecodeError>;
}

/// Registry mapping each configured [`SourceFormat`] to its decoder.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    decoders: FxHashMap<SourceFormat, Arc<dyn FormatDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, format: SourceFormat, decoder: Arc<dyn FormatDecoder>) {
        self.decoders.insert(format, decoder);
    }

    pub fn get(&self, format: SourceFormat) -> Option<Arc<dyn FormatDecoder>> {
        self.decoders.get(&format).cloned()
    }

    pub fn contains(&self, format: SourceFormat) -> bool {
        self.decoders.contains_key(&format)
    }
}

impl fmt::Debug for DecoderRegistry {
    // Decoders are trait objects without Debug; render the registered formats.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}
