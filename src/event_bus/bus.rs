use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream;
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::timeout;

use super::emitter::BusEmitter;
use super::event::PipelineEvent;
use super::sink::{ChannelSink, EventSink, StdOutSink};

/// EventBus receives pipeline events and broadcasts them to all sinks.
///
/// Each pipeline run owns its own bus; there is no process-global signal
/// surface, so concurrent runs cannot observe each other's events.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    event_channel: (flume::Sender<PipelineEvent>, flume::Receiver<PipelineEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create an EventBus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create an EventBus with multiple sinks (possibly none).
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            event_channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Dynamically add a sink (useful for per-run streaming).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks
            .lock()
            .expect("sinks poisoned")
            .push(Box::new(sink));
    }

    /// Get a cloneable emitter so producers can publish events.
    pub fn get_emitter(&self) -> BusEmitter {
        BusEmitter::new(self.event_channel.0.clone())
    }

    /// Subscribe to every event broadcast from now on.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = flume::unbounded();
        self.add_sink(ChannelSink::new(tx));
        EventStream { receiver: rx }
    }

    /// Spawn a background task that listens for events and broadcasts to all
    /// sinks. Idempotent: calling multiple times has no effect.
    pub fn listen_for_events(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return; // Already listening
        }

        let receiver = self.event_channel.1.clone();
        let sinks = Arc::clone(&self.sinks);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        // Drain whatever was published before shutdown so
                        // subscribers always observe the terminal event.
                        while let Ok(event) = receiver.try_recv() {
                            broadcast(&sinks, &event);
                        }
                        break;
                    }
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => broadcast(&sinks, &event),
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener task, flushing pending events first.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

fn broadcast(sinks: &Arc<Mutex<Vec<Box<dyn EventSink>>>>, event: &PipelineEvent) {
    let mut guard = sinks.lock().expect("sinks poisoned");
    for sink in guard.iter_mut() {
        if let Err(err) = sink.handle(event) {
            tracing::debug!(error = %err, "event sink error");
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

/// Receiving side of [`EventBus::subscribe`].
///
/// The stream ends once the bus is dropped and all buffered events have been
/// consumed, so a subscriber always sees the terminal event before `None`.
pub struct EventStream {
    receiver: flume::Receiver<PipelineEvent>,
}

impl EventStream {
    /// Await the next event; `None` once the bus is gone and the buffer is
    /// drained.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.recv_async().await.ok()
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.try_recv().ok()
    }

    /// Await the next event with a deadline.
    pub async fn next_timeout(&mut self, duration: Duration) -> Option<PipelineEvent> {
        timeout(duration, self.recv()).await.ok().flatten()
    }

    /// Adapt into a `futures_util::Stream` of events.
    pub fn into_async_stream(self) -> impl futures_util::stream::Stream<Item = PipelineEvent> {
        stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}
