//! Flow-controller behavior: batching thresholds, watermark signaling,
//! in-flight bounds, and failure draining.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use common::{FailingSink, GaugeSink, RecordingSink};
use docflux::config::{Concurrency, QueueConfig};
use docflux::document::Document;
use docflux::event_bus::{EventBus, PipelineEvent, QueueEvent};
use docflux::pipeline::BackpressureGate;
use docflux::queue::{IndexQueue, ProtocolError};

fn doc(i: usize) -> Document {
    Document::new(json!({"i": i}))
}

fn quiet_bus() -> EventBus {
    EventBus::with_sinks(Vec::new())
}

fn base_config() -> QueueConfig {
    QueueConfig::default()
        .with_flush_docs(2)
        .with_flush_bytes(1 << 20)
        .with_watermarks(1 << 20, 1 << 19)
        .with_concurrency(Concurrency::Fixed(1))
}

#[tokio::test]
async fn flushes_on_document_threshold() {
    let sink = RecordingSink::new();
    let bus = quiet_bus();
    let queue = IndexQueue::new(
        "target",
        base_config(),
        Arc::new(sink.clone()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    for i in 0..5 {
        queue.add(doc(i)).unwrap();
    }
    let stats = queue.finish().await.unwrap();

    assert_eq!(stats.docs_submitted, 5);
    assert_eq!(stats.docs_flushed, 5);
    assert_eq!(stats.batches, 3);

    let batches = sink.batches();
    let docs_per_batch: Vec<usize> = batches.iter().map(|b| b.docs()).collect();
    assert_eq!(docs_per_batch, vec![2, 2, 1]);
    // One synthesized action header per document.
    assert_eq!(batches[0].lines().len(), 4);
    assert_eq!(
        batches[0].lines()[0],
        json!({"index": {"_index": "target"}})
    );
}

#[tokio::test]
async fn flushes_on_byte_threshold() {
    let sink = RecordingSink::new();
    let bus = quiet_bus();
    let cfg = base_config().with_flush_docs(1_000_000).with_flush_bytes(64);
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink.clone()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    for i in 0..4 {
        queue.add(doc(i)).unwrap();
    }
    let stats = queue.finish().await.unwrap();
    assert_eq!(stats.docs_flushed, 4);
    assert!(stats.batches >= 2, "byte threshold never sealed a batch");
}

#[tokio::test]
async fn add_after_finish_is_a_protocol_error() {
    let bus = quiet_bus();
    let queue = IndexQueue::new(
        "target",
        base_config(),
        Arc::new(RecordingSink::new()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    queue.add(doc(0)).unwrap();
    queue.finish().await.unwrap();

    let err = queue.add(doc(1)).unwrap_err();
    assert!(matches!(err, ProtocolError::AddAfterFinish));
}

#[tokio::test]
async fn watermarks_pause_and_resume_exactly_once() {
    let sink = RecordingSink::with_delay(Duration::from_millis(40));
    let bus = quiet_bus();
    bus.listen_for_events();
    let mut events = bus.subscribe();
    let gate = BackpressureGate::new();

    // Every document becomes its own batch; Fixed(1) forces later batches
    // to queue up as buffered bytes.
    let cfg = base_config().with_flush_docs(1).with_watermarks(100, 50);
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink.clone()),
        bus.get_emitter(),
        gate.clone(),
    );

    for i in 0..4 {
        queue.add(doc(i)).unwrap();
    }
    assert!(gate.is_paused(), "high-water crossing must pause the gate");

    let stats = queue.finish().await.unwrap();
    assert_eq!(stats.docs_flushed, 4);
    assert!(!gate.is_paused(), "drained queue must leave the gate open");

    bus.stop_listener().await;
    let mut signals = Vec::new();
    while let Some(event) = events.try_recv() {
        match event {
            PipelineEvent::Queue(QueueEvent::Paused { .. }) => signals.push("paused"),
            PipelineEvent::Queue(QueueEvent::Resumed { .. }) => signals.push("resumed"),
            _ => {}
        }
    }
    assert_eq!(signals, vec!["paused", "resumed"]);
}

#[tokio::test]
async fn in_flight_writes_respect_the_fixed_bound() {
    let sink = GaugeSink::new(Duration::from_millis(30));
    let bus = quiet_bus();
    let cfg = base_config()
        .with_flush_docs(1)
        .with_concurrency(Concurrency::Fixed(2));
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink.clone()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    for i in 0..6 {
        queue.add(doc(i)).unwrap();
    }
    queue.finish().await.unwrap();

    assert!(sink.max_in_flight() >= 1);
    assert!(
        sink.max_in_flight() <= 2,
        "observed {} concurrent writes with a bound of 2",
        sink.max_in_flight()
    );
}

#[tokio::test]
async fn sink_failure_lets_in_flight_writes_settle() {
    // Five single-doc batches dispatch concurrently; one of them fails.
    let sink = FailingSink::with_delay(3, Duration::from_millis(30));
    let bus = quiet_bus();
    let cfg = base_config()
        .with_flush_docs(1)
        .with_concurrency(Concurrency::Fixed(5));
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink.clone()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    for i in 0..5 {
        queue.add(doc(i)).unwrap();
    }
    let err = queue.finish().await.unwrap_err();
    assert!(err.to_string().contains("rejected"));

    assert_eq!(sink.calls(), 5, "already-issued writes must not be cancelled");
    assert_eq!(sink.completed(), 5, "in-flight writes must settle");
    assert!(queue.is_failed());
}

#[tokio::test]
async fn failure_releases_a_paused_gate() {
    let sink = FailingSink::with_delay(1, Duration::from_millis(20));
    let bus = quiet_bus();
    let gate = BackpressureGate::new();
    let cfg = base_config()
        .with_flush_docs(1)
        .with_concurrency(Concurrency::Fixed(1))
        .with_watermarks(40, 20);
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink),
        bus.get_emitter(),
        gate.clone(),
    );

    for i in 0..4 {
        queue.add(doc(i)).unwrap();
    }
    assert!(gate.is_paused());

    queue.finish().await.unwrap_err();
    assert!(
        !gate.is_paused(),
        "a failing queue must not leave the producer paused"
    );
}

#[tokio::test]
async fn shutdown_discards_pending_and_keeps_issued_writes() {
    let sink = RecordingSink::with_delay(Duration::from_millis(40));
    let bus = quiet_bus();
    let cfg = base_config().with_flush_docs(1);
    let queue = IndexQueue::new(
        "target",
        cfg,
        Arc::new(sink.clone()),
        bus.get_emitter(),
        BackpressureGate::new(),
    );

    for i in 0..3 {
        queue.add(doc(i)).unwrap();
    }
    // One write is in flight; two batches are still pending.
    let failure = queue.shutdown().await;
    assert!(failure.is_none());

    assert_eq!(sink.batches().len(), 1);
    let state = queue.state();
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.pending_batches, 0);
}
