use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::PipelineEvent;

/// Abstraction over an output target that consumes full event objects.
pub trait EventSink: Send + Sync {
    /// Handle a structured event. The sink decides how to render it.
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()>;
}

/// Stdout sink, one event per line.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        writeln!(self.handle, "{event}")?;
        self.handle.flush()
    }
}

/// In-memory sink for testing and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all captured events.
    pub fn snapshot(&self) -> Vec<PipelineEvent> {
        self.entries.lock().expect("sink entries poisoned").clone()
    }

    /// Clear all captured events.
    pub fn clear(&self) {
        self.entries.lock().expect("sink entries poisoned").clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        self.entries
            .lock()
            .expect("sink entries poisoned")
            .push(event.clone());
        Ok(())
    }
}

/// Channel-based sink forwarding events to an async consumer; this is what
/// backs [`EventBus::subscribe`](super::EventBus::subscribe).
pub struct ChannelSink {
    tx: flume::Sender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &PipelineEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "subscriber dropped"))
    }
}
