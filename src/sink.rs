//! External interfaces on the target-store side.
//!
//! The pipeline never speaks the store's wire protocol. Bulk writes go
//! through [`BulkSink`] and the pre-run mapping/schema step goes through
//! [`TargetPreparer`]; both are supplied by the embedder.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::queue::Batch;

/// A batch write failed. The pipeline performs no automatic retry; a sink
/// that wants retries wraps them internally.
#[derive(Clone, Debug, Error)]
pub enum SinkError {
    /// The store accepted the request but rejected the batch.
    #[error("bulk write rejected: {detail}")]
    Rejected { detail: String },

    /// The request never completed (connection loss, timeout).
    #[error("bulk transport failure: {detail}")]
    Transport { detail: String },
}

impl SinkError {
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::Rejected {
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport {
            detail: detail.into(),
        }
    }
}

/// Result of one bulk write, as an explicit value rather than a callback.
#[derive(Debug)]
pub enum WriteOutcome {
    Success {
        /// Documents the store acknowledged.
        docs: usize,
        /// Round-trip time reported by the sink; feeds the adaptive
        /// concurrency window.
        elapsed: Duration,
    },
    Failure(SinkError),
}

/// Batched write interface against the target document store.
///
/// The queue hands over ownership of the [`Batch`]; once `write` resolves
/// the batch is gone either way.
#[async_trait]
pub trait BulkSink: Send + Sync {
    async fn write(&self, batch: Batch) -> WriteOutcome;
}

/// Target readiness failed; the run never starts producing.
#[derive(Debug, Error)]
#[error("target preparation failed: {0}")]
pub struct PrepareError(pub String);

impl PrepareError {
    pub fn msg(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// Pre-run mapping/schema step (create the target, optionally dropping an
/// existing one first). Runs before any source I/O.
#[async_trait]
pub trait TargetPreparer: Send + Sync {
    async fn prepare(&self, target: &str, recreate: bool) -> Result<(), PrepareError>;
}
