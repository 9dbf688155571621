//! Event bus utilities providing fan-out, sinks, and subscriber APIs.
//!
//! The module is organised around a per-run [`EventBus`] broadcasting
//! [`PipelineEvent`]s to configured sinks, and an [`EventStream`] for async
//! subscribers.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod sink;

pub use bus::{EventBus, EventStream};
pub use emitter::{BusEmitter, EmitterError, EventEmitter};
pub use event::{
    ErrorEvent, ErrorKind, FinishedEvent, IndexedEvent, PipelineEvent, ProgressEvent, QueueEvent,
};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
