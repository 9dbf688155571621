use std::fmt;
use thiserror::Error;

use super::event::PipelineEvent;

/// Abstract event emitter handed to pipeline components so they can publish
/// without knowing about sinks or subscribers.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event in a synchronous, non-blocking manner.
    fn emit(&self, event: PipelineEvent) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event channel closed")]
    Closed,
}

/// Emitter backed by the bus's flume channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct BusEmitter {
    sender: flume::Sender<PipelineEvent>,
}

impl BusEmitter {
    pub(crate) fn new(sender: flume::Sender<PipelineEvent>) -> Self {
        Self { sender }
    }
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: PipelineEvent) -> Result<(), EmitterError> {
        self.sender.send(event).map_err(|_| EmitterError::Closed)
    }
}
