//! Reading documents out of a caller-supplied byte channel.

use async_trait::async_trait;
use std::sync::Arc;

use super::{DocumentSource, SourceError, SourceRecord};
use crate::decode::{ByteReader, DecodeError, DecoderOptions, FormatDecoder, RecordStream};

/// Produces records from one externally supplied byte stream.
///
/// The stream takes ownership of the reader and is the only consumer;
/// dropping the decoded stream in [`close`](DocumentSource::close) releases
/// the underlying channel on success and failure paths alike.
pub struct StreamSource {
    active: Option<Box<dyn RecordStream>>,
    skip_header: bool,
    header_skipped: bool,
}

impl StreamSource {
    pub async fn open(
        reader: ByteReader,
        decoder: Arc<dyn FormatDecoder>,
        options: &DecoderOptions,
        skip_header: bool,
    ) -> Result<Self, SourceError> {
        let stream = decoder
            .open(reader, options)
            .await
            .map_err(SourceError::from_decode)?;
        Ok(Self {
            active: Some(stream),
            skip_header,
            header_skipped: false,
        })
    }
}

#[async_trait]
impl DocumentSource for StreamSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceError> {
        loop {
            let step = match self.active.as_mut() {
                Some(stream) => stream.next_record().await,
                None => return Ok(None),
            };

            match step {
                Some(Ok(doc)) => {
                    if self.skip_header && !self.header_skipped {
                        self.header_skipped = true;
                        continue;
                    }
                    return Ok(Some(SourceRecord { doc, origin: None }));
                }
                Some(Err(DecodeError::Io(err))) => return Err(SourceError::Io(err)),
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "dropping malformed record");
                    continue;
                }
                None => {
                    self.active = None;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.active = None;
        tracing::debug!("stream source closed");
    }
}
