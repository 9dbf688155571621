//! Batch assembly for bulk writes.

use serde_json::{Value, json};

use crate::document::Document;

/// An ordered bulk-request body destined for one sink call: action headers
/// and document payloads interleaved, plus the bookkeeping the flow
/// controller needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    lines: Vec<Value>,
    docs: usize,
    bytes: usize,
}

impl Batch {
    /// Bulk-body lines in write order.
    pub fn lines(&self) -> &[Value] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<Value> {
        self.lines
    }

    /// Number of documents (not lines) carried by this batch.
    pub fn docs(&self) -> usize {
        self.docs
    }

    /// Estimated serialized size.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// Accumulates documents into the next [`Batch`].
///
/// Unless the run replays a pre-paired action stream, every document gets a
/// synthesized `{"index": {"_index": target}}` action header, so one added
/// document contributes two bulk-body lines.
pub(crate) struct BulkBuffer {
    lines: Vec<Value>,
    docs: usize,
    bytes: usize,
    action: Option<Value>,
    action_bytes: usize,
    /// Replay mode only: the last pushed line was an action header still
    /// waiting for its document line.
    pending_action: bool,
}

impl BulkBuffer {
    pub fn new(target_index: &str, replay_actions: bool) -> Self {
        let action = (!replay_actions).then(|| json!({"index": {"_index": target_index}}));
        let action_bytes = action
            .as_ref()
            .and_then(|a| serde_json::to_vec(a).ok())
            .map(|b| b.len())
            .unwrap_or(0);
        Self {
            lines: Vec::new(),
            docs: 0,
            bytes: 0,
            action,
            action_bytes,
            pending_action: false,
        }
    }

    /// Append one document (or, in replay mode, one raw bulk line) and
    /// return the byte growth.
    pub fn push(&mut self, doc: Document) -> usize {
        let doc_bytes = doc.estimated_bytes();
        let mut grown = doc_bytes;
        match &self.action {
            Some(action) => {
                self.lines.push(action.clone());
                self.lines.push(doc.into_value());
                self.docs += 1;
                grown += self.action_bytes;
            }
            None => {
                self.lines.push(doc.into_value());
                if self.pending_action {
                    self.docs += 1;
                }
                self.pending_action = !self.pending_action;
            }
        }
        self.bytes += grown;
        grown
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Whether the buffer has reached a flush threshold. In replay mode a
    /// batch never splits an action header from its document.
    pub fn should_flush(&self, flush_docs: usize, flush_bytes: usize) -> bool {
        if self.pending_action {
            return false;
        }
        self.docs >= flush_docs || self.bytes >= flush_bytes
    }

    /// Take the accumulated contents as a sealed [`Batch`].
    pub fn seal(&mut self) -> Batch {
        let batch = Batch {
            lines: std::mem::take(&mut self.lines),
            docs: self.docs,
            bytes: self.bytes,
        };
        self.docs = 0;
        self.bytes = 0;
        self.pending_action = false;
        batch
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.docs = 0;
        self.bytes = 0;
        self.pending_action = false;
    }
}
