use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One entry on a pipeline run's aggregated event channel.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum PipelineEvent {
    /// A batch resolved against the sink.
    Indexed(IndexedEvent),
    /// Cumulative throughput after a batch resolved.
    Progress(ProgressEvent),
    /// Flow-controller state changes (pause/resume/depth).
    Queue(QueueEvent),
    /// Terminal: the run completed with no error.
    Finished(FinishedEvent),
    /// Terminal: the run failed.
    Error(ErrorEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedEvent {
    pub docs: usize,
    pub elapsed_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub docs_total: u64,
    pub docs_per_second: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueEvent {
    Paused {
        buffered_bytes: usize,
    },
    Resumed {
        buffered_bytes: usize,
    },
    Depth {
        buffered_bytes: usize,
        in_flight: usize,
        pending_batches: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishedEvent {
    pub docs_total: u64,
}

/// Classifies a run-level failure on the event channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Prepare,
    SourceIo,
    SinkWrite,
    Protocol,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Prepare => "prepare",
            ErrorKind::SourceIo => "source_io",
            ErrorKind::SinkWrite => "sink_write",
            ErrorKind::Protocol => "protocol",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    pub kind: ErrorKind,
    pub detail: String,
}

impl PipelineEvent {
    pub fn indexed(docs: usize, elapsed: Duration) -> Self {
        PipelineEvent::Indexed(IndexedEvent {
            docs,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    pub fn progress(docs_total: u64, docs_per_second: f64) -> Self {
        PipelineEvent::Progress(ProgressEvent {
            docs_total,
            docs_per_second,
        })
    }

    pub fn paused(buffered_bytes: usize) -> Self {
        PipelineEvent::Queue(QueueEvent::Paused { buffered_bytes })
    }

    pub fn resumed(buffered_bytes: usize) -> Self {
        PipelineEvent::Queue(QueueEvent::Resumed { buffered_bytes })
    }

    pub fn depth(buffered_bytes: usize, in_flight: usize, pending_batches: usize) -> Self {
        PipelineEvent::Queue(QueueEvent::Depth {
            buffered_bytes,
            in_flight,
            pending_batches,
        })
    }

    pub fn finished(docs_total: u64) -> Self {
        PipelineEvent::Finished(FinishedEvent { docs_total })
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        PipelineEvent::Error(ErrorEvent {
            when: Utc::now(),
            kind,
            detail: detail.into(),
        })
    }

    /// Stable label identifying the event variant.
    pub fn kind_label(&self) -> &'static str {
        match self {
            PipelineEvent::Indexed(_) => "indexed",
            PipelineEvent::Progress(_) => "progress",
            PipelineEvent::Queue(QueueEvent::Paused { .. }) => "paused",
            PipelineEvent::Queue(QueueEvent::Resumed { .. }) => "resumed",
            PipelineEvent::Queue(QueueEvent::Depth { .. }) => "queue_depth",
            PipelineEvent::Finished(_) => "finished",
            PipelineEvent::Error(_) => "error",
        }
    }

    /// Whether this event ends the run. Exactly one terminal event is
    /// emitted per run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineEvent::Finished(_) | PipelineEvent::Error(_))
    }

    /// Normalized JSON rendering: `{"type", "detail", "timestamp"}`.
    pub fn to_json_value(&self) -> Value {
        let detail = match self {
            PipelineEvent::Indexed(ev) => json!({"docs": ev.docs, "elapsed_ms": ev.elapsed_ms}),
            PipelineEvent::Progress(ev) => json!({
                "docs_total": ev.docs_total,
                "docs_per_second": ev.docs_per_second,
            }),
            PipelineEvent::Queue(ev) => serde_json::to_value(ev).unwrap_or(Value::Null),
            PipelineEvent::Finished(ev) => json!({"docs_total": ev.docs_total}),
            PipelineEvent::Error(ev) => json!({"kind": ev.kind.label(), "detail": ev.detail}),
        };
        let timestamp = match self {
            PipelineEvent::Error(ev) => ev.when,
            _ => Utc::now(),
        };
        json!({
            "type": self.kind_label(),
            "detail": detail,
            "timestamp": timestamp.to_rfc3339(),
        })
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineEvent::Indexed(ev) => {
                write!(f, "indexed {} docs in {}ms", ev.docs, ev.elapsed_ms)
            }
            PipelineEvent::Progress(ev) => write!(
                f,
                "progress: {} docs, {:.1} docs/s",
                ev.docs_total, ev.docs_per_second
            ),
            PipelineEvent::Queue(QueueEvent::Paused { buffered_bytes }) => {
                write!(f, "paused at {buffered_bytes} buffered bytes")
            }
            PipelineEvent::Queue(QueueEvent::Resumed { buffered_bytes }) => {
                write!(f, "resumed at {buffered_bytes} buffered bytes")
            }
            PipelineEvent::Queue(QueueEvent::Depth {
                buffered_bytes,
                in_flight,
                pending_batches,
            }) => write!(
                f,
                "queue depth: {buffered_bytes} bytes buffered, {in_flight} in flight, {pending_batches} pending"
            ),
            PipelineEvent::Finished(ev) => write!(f, "finished: {} docs", ev.docs_total),
            PipelineEvent::Error(ev) => write!(f, "error[{}]: {}", ev.kind.label(), ev.detail),
        }
    }
}
