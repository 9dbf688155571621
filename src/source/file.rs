//! Reading documents out of local files matched by a glob pattern.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use super::{DocumentSource, SourceError, SourceRecord};
use crate::decode::{ByteReader, DecodeError, DecoderOptions, FormatDecoder, RecordStream};

/// Produces records from the files matching a glob pattern, strictly one
/// file at a time in sorted order. Sequential processing bounds memory and
/// keeps error attribution (which file failed) unambiguous.
pub struct FileSource {
    files: Vec<PathBuf>,
    /// Index of the file currently (or next) being read; the file-list
    /// cursor survives pause/resume untouched.
    cursor: usize,
    decoder: Arc<dyn FormatDecoder>,
    options: DecoderOptions,
    skip_header: bool,
    header_skipped: bool,
    active: Option<Box<dyn RecordStream>>,
    active_path: Option<String>,
}

impl FileSource {
    /// Expand `pattern` and prepare to read the matches in sorted order.
    ///
    /// Zero matches is not an error; the source reports immediate
    /// exhaustion.
    pub fn new(
        pattern: &str,
        decoder: Arc<dyn FormatDecoder>,
        options: DecoderOptions,
        skip_header: bool,
    ) -> Result<Self, SourceError> {
        let mut files = Vec::new();
        for entry in glob::glob(pattern)? {
            let path = entry.map_err(|err| SourceError::Io(err.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            tracing::warn!(pattern, "no files matched the source pattern");
        } else {
            tracing::debug!(pattern, count = files.len(), "expanded source pattern");
        }
        Ok(Self {
            files,
            cursor: 0,
            decoder,
            options,
            skip_header,
            header_skipped: false,
            active: None,
            active_path: None,
        })
    }

    async fn open_next(&mut self) -> Result<bool, SourceError> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(false);
        };
        let file = tokio::fs::File::open(path).await?;
        let reader: ByteReader = Box::new(BufReader::new(file));
        let stream = self
            .decoder
            .open(reader, &self.options)
            .await
            .map_err(SourceError::from_decode)?;
        tracing::debug!(file = %path.display(), "reading source file");
        self.active_path = Some(path.display().to_string());
        self.active = Some(stream);
        Ok(true)
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceError> {
        loop {
            if self.active.is_none() && !self.open_next().await? {
                return Ok(None);
            }

            let step = match self.active.as_mut() {
                Some(stream) => stream.next_record().await,
                None => return Ok(None),
            };

            match step {
                Some(Ok(doc)) => {
                    // The header row belongs to the dataset, not to each
                    // fragment: only the very first file's first record is
                    // skipped.
                    if self.skip_header && !self.header_skipped && self.cursor == 0 {
                        self.header_skipped = true;
                        continue;
                    }
                    return Ok(Some(SourceRecord {
                        doc,
                        origin: self.active_path.clone(),
                    }));
                }
                Some(Err(DecodeError::Io(err))) => return Err(SourceError::Io(err)),
                Some(Err(err)) => {
                    tracing::warn!(
                        file = self.active_path.as_deref().unwrap_or("<unknown>"),
                        error = %err,
                        "dropping malformed record"
                    );
                    continue;
                }
                None => {
                    self.active = None;
                    self.active_path = None;
                    self.cursor += 1;
                    continue;
                }
            }
        }
    }

    async fn close(&mut self) {
        self.active = None;
        self.active_path = None;
        self.files.clear();
        tracing::debug!("file source closed");
    }
}
