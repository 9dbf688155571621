//! The per-record transform stage.
//!
//! A transform is a pure mapping applied to every decoded document before it
//! reaches the flow controller. It can rewrite the document, fan one record
//! out into several, or skip it entirely. Transform failures are contained:
//! the offending record is dropped and the source keeps producing.

use std::sync::Arc;
use thiserror::Error;

use crate::document::Document;

/// Outcome of applying a transform to one record.
#[derive(Clone, Debug)]
pub enum Transformed {
    /// Replace the record with this document.
    One(Document),
    /// Fan the record out into zero or more documents (entity splitting).
    Many(Vec<Document>),
    /// Drop the record.
    Skip,
}

/// Provenance handed to the transform alongside each record.
#[derive(Clone, Debug, Default)]
pub struct TransformContext {
    /// Originating file path or remote index name, when the source knows it.
    pub origin: Option<String>,
}

/// A transform rejected one record.
#[derive(Debug, Error)]
#[error("transform failed: {0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn msg(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// The user-supplied mapping applied per record.
pub type Transform =
    Arc<dyn Fn(&Document, &TransformContext) -> Result<Transformed, TransformError> + Send + Sync>;

/// Run `transform` over one record, containing failures.
///
/// Returns the documents to enqueue; empty when the record is skipped or the
/// transform errored. With no transform configured the record passes through
/// unchanged.
pub fn apply(
    transform: Option<&Transform>,
    doc: Document,
    ctx: &TransformContext,
) -> Vec<Document> {
    let Some(transform) = transform else {
        return vec![doc];
    };
    match transform(&doc, ctx) {
        Ok(Transformed::One(out)) => vec![out],
        Ok(Transformed::Many(out)) => out,
        Ok(Transformed::Skip) => Vec::new(),
        Err(err) => {
            tracing::warn!(
                origin = ctx.origin.as_deref().unwrap_or("<unknown>"),
                error = %err,
                "transform rejected record; dropping it"
            );
            Vec::new()
        }
    }
}
