//! Flow-controlled batching between the document source and the bulk sink.

mod adaptive;
pub mod batch;
pub mod flow;

pub use batch::Batch;
pub use flow::{IndexQueue, ProtocolError, QueueState, QueueStats};
