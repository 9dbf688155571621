//! Reading documents back out of a remote index via a scroll cursor.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;

use super::{DocumentSource, SourceError, SourceRecord};
use crate::document::Document;

/// Opaque continuation token returned by the remote store; required to
/// fetch the next page.
pub type ScrollToken = String;

/// Parameters for establishing a scroll over a remote index.
#[derive(Clone, Debug, PartialEq)]
pub struct ScrollRequest {
    pub index: String,
    /// Structured query filter; `None` matches everything.
    pub filter: Option<Value>,
    pub page_size: usize,
    /// Field allow-list applied as a `_source` projection on the main pass.
    pub projection: Option<Vec<String>>,
}

/// One page of scroll results.
#[derive(Clone, Debug)]
pub struct ScrollPage {
    pub token: ScrollToken,
    /// Total hits the whole scroll will deliver, as reported by the first
    /// response and repeated on every page.
    pub total: u64,
    pub hits: Vec<Document>,
}

/// The remote search interface this source consumes; the pipeline never
/// speaks the store's wire protocol itself.
#[derive(Clone, Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {detail}")]
    Request { detail: String },

    #[error("scroll expired or invalid: {detail}")]
    Scroll { detail: String },
}

impl SearchError {
    pub fn request(detail: impl Into<String>) -> Self {
        Self::Request {
            detail: detail.into(),
        }
    }

    pub fn scroll(detail: impl Into<String>) -> Self {
        Self::Scroll {
            detail: detail.into(),
        }
    }
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Establish a scroll: returns the first page, the continuation token,
    /// and the total expected count.
    async fn open_scroll(&self, request: &ScrollRequest) -> Result<ScrollPage, SearchError>;

    /// Fetch the next page for a previously returned token.
    async fn continue_scroll(&self, token: &ScrollToken) -> Result<ScrollPage, SearchError>;

    /// Fetch `request.page_size` documents under randomized relevance
    /// re-scoring of the same filter; feeds the populated-fields pre-pass.
    async fn sample(&self, request: &ScrollRequest) -> Result<Vec<Document>, SearchError>;

    /// Invalidate a scroll cursor server-side.
    async fn clear_scroll(&self, token: &ScrollToken) -> Result<(), SearchError>;
}

/// Scroll position owned by the source; survives pause/resume and is
/// invalidated exactly once on close.
struct ScrollCursor {
    token: ScrollToken,
    retrieved: u64,
    total: u64,
}

/// Produces records by paging through a remote index.
pub struct RemoteIndexSource {
    client: Arc<dyn SearchClient>,
    index: String,
    filter: Option<Value>,
    page_size: usize,
    populated_fields_only: bool,
    cursor: Option<ScrollCursor>,
    buffered: VecDeque<Document>,
    opened: bool,
    exhausted: bool,
}

impl RemoteIndexSource {
    pub fn new(
        client: Arc<dyn SearchClient>,
        index: impl Into<String>,
        filter: Option<Value>,
        page_size: usize,
        populated_fields_only: bool,
    ) -> Self {
        Self {
            client,
            index: index.into(),
            filter,
            page_size,
            populated_fields_only,
            cursor: None,
            buffered: VecDeque::new(),
            opened: false,
            exhausted: false,
        }
    }

    fn base_request(&self) -> ScrollRequest {
        ScrollRequest {
            index: self.index.clone(),
            filter: self.filter.clone(),
            page_size: self.page_size,
            projection: None,
        }
    }

    /// Pre-pass: sample documents under randomized re-scoring and union the
    /// field names present in their payloads. Any failure falls back to
    /// unprojected retrieval.
    async fn resolve_projection(&self) -> Option<Vec<String>> {
        if !self.populated_fields_only {
            return None;
        }
        match self.client.sample(&self.base_request()).await {
            Ok(sampled) => {
                let mut fields = BTreeSet::new();
                for doc in &sampled {
                    for name in doc.field_names() {
                        fields.insert(name.to_string());
                    }
                }
                tracing::debug!(
                    index = %self.index,
                    sampled = sampled.len(),
                    fields = fields.len(),
                    "resolved populated-fields projection"
                );
                Some(fields.into_iter().collect())
            }
            Err(err) => {
                tracing::warn!(
                    index = %self.index,
                    error = %err,
                    "populated-fields sampling failed; retrieving all fields"
                );
                None
            }
        }
    }

    async fn open(&mut self) -> Result<(), SourceError> {
        let mut request = self.base_request();
        request.projection = self.resolve_projection().await;

        let page = self.client.open_scroll(&request).await?;
        let retrieved = page.hits.len() as u64;
        tracing::debug!(
            index = %self.index,
            total = page.total,
            first_page = retrieved,
            "scroll established"
        );
        self.cursor = Some(ScrollCursor {
            token: page.token,
            retrieved,
            total: page.total,
        });
        self.buffered.extend(page.hits);
        self.opened = true;
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for RemoteIndexSource {
    async fn next_record(&mut self) -> Result<Option<SourceRecord>, SourceError> {
        loop {
            if let Some(doc) = self.buffered.pop_front() {
                return Ok(Some(SourceRecord {
                    doc,
                    origin: Some(self.index.clone()),
                }));
            }
            if self.exhausted {
                return Ok(None);
            }
            if !self.opened {
                self.open().await?;
                continue;
            }

            let Some(cursor) = self.cursor.as_mut() else {
                return Ok(None);
            };
            if cursor.retrieved >= cursor.total {
                tracing::debug!(index = %self.index, retrieved = cursor.retrieved, "finished scrolling");
                self.exhausted = true;
                continue;
            }

            let page = self.client.continue_scroll(&cursor.token).await?;
            cursor.token = page.token;
            cursor.retrieved += page.hits.len() as u64;
            if page.hits.is_empty() {
                // An empty page ends the scroll even if the reported total
                // was never reached.
                self.exhausted = true;
                continue;
            }
            self.buffered.extend(page.hits);
        }
    }

    async fn close(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            if let Err(err) = self.client.clear_scroll(&cursor.token).await {
                tracing::debug!(index = %self.index, error = %err, "failed to clear scroll");
            }
        }
        self.buffered.clear();
        self.exhausted = true;
        tracing::debug!(index = %self.index, "remote index source closed");
    }
}
