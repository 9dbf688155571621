//! Origin-specific document producers.
//!
//! The three origins (local files, a caller-supplied byte stream, and a
//! paginated remote index) implement one polymorphic [`DocumentSource`]
//! trait. Pause/resume is not part of the trait: the pipeline pump awaits
//! the run's backpressure gate before each pull, so an in-flight read lands
//! normally and only the *next* unit of work waits.

use async_trait::async_trait;
use thiserror::Error;

use crate::decode::DecodeError;
use crate::document::Document;

pub mod file;
pub mod remote;
pub mod stream;

pub use file::FileSource;
pub use remote::{
    RemoteIndexSource, ScrollPage, ScrollRequest, ScrollToken, SearchClient, SearchError,
};
pub use stream::StreamSource;

/// One decoded record plus its provenance.
#[derive(Clone, Debug)]
pub struct SourceRecord {
    pub doc: Document,
    /// Originating file path or remote index name, when known.
    pub origin: Option<String>,
}

/// Unrecoverable failure while reading a source; fatal for the run.
/// Record-level decode problems never surface here: sources drop the
/// record and keep producing.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file glob: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("decoder could not open input: {0}")]
    Decoder(#[source] DecodeError),

    #[error("remote search failed: {0}")]
    Search(#[from] SearchError),
}

impl SourceError {
    /// Lift a decoder error out of a stream: I/O problems keep their
    /// identity, anything else is an open/decode failure.
    pub(crate) fn from_decode(err: DecodeError) -> Self {
        match err {
            DecodeError::Io(io) => SourceError::Io(io),
            other => SourceError::Decoder(other),
        }
    }
}

/// A producer of decoded records from exactly one origin.
///
/// Implementations own their handle, reader, or scroll cursor exclusively
/// and release it in [`close`](Self::close) on every exit path; `close` is
/// idempotent.
#[async_trait]
pub trait DocumentSource: Send {
    /// Pull the next record. `Ok(None)` signals exhaustion; an error is
    /// fatal and the source stops producing.
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceError>;

    /// Release handles and invalidate cursors.
    async fn close(&mut self);
}
