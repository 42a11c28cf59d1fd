//! Delivery engine lifecycle: start, drain, and forced shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use herald_core::{DeliveryEvent, DeliveryTarget, EventHandler};
use herald_delivery::{
    DeliveryEngine, DeliveryError, DeliveryTask, EngineConfig, IntegrationRegistry, QueueError,
    RetryPolicy, TaskQueue,
};
use herald_testing::{
    EventBuilder, MockTransport, RecordingEventHandler, Reply, TestClock, DEFAULT_EVENT_TIMEOUT,
};

fn config(worker_count: usize) -> EngineConfig {
    EngineConfig {
        worker_count,
        queue_capacity: 16,
        shutdown_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy::default().without_jitter(),
        ..EngineConfig::default()
    }
}

fn engine(
    config: EngineConfig,
    transport: &MockTransport,
    events: &RecordingEventHandler,
) -> DeliveryEngine {
    DeliveryEngine::with_transport(
        config,
        IntegrationRegistry::default(),
        Arc::new(transport.clone()),
    )
    .with_clock(Arc::new(TestClock::new()))
    .with_event_handler(Arc::new(events.clone()))
}

fn task(url: &str) -> DeliveryTask {
    DeliveryTask::new(DeliveryTarget::webhook(url), EventBuilder::new("scan.completed").build())
}

#[tokio::test]
async fn delivers_queued_tasks_and_drains_on_shutdown() -> Result<()> {
    let transport = MockTransport::new();
    transport.route("https://b.example/hook", [Reply::Status(503)]);
    let events = RecordingEventHandler::new();
    let mut engine = engine(config(2), &transport, &events);
    let queue = engine.queue();

    engine.start()?;
    for url in ["https://a.example/hook", "https://b.example/hook", "https://c.example/hook"] {
        queue.enqueue(task(url))?;
    }

    let terminal = events.wait_for_terminal(3, DEFAULT_EVENT_TIMEOUT).await;
    assert!(terminal.iter().all(|e| matches!(e, DeliveryEvent::Succeeded(_))));
    assert_eq!(transport.requests_to("https://b.example/hook").len(), 2);

    let stats = engine.stats();
    assert_eq!(stats.tasks_queued, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.retries_scheduled, 1);
    assert_eq!(stats.active_workers, 2);

    engine.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn closed_queue_rejects_new_tasks() -> Result<()> {
    let events = RecordingEventHandler::new();
    let mut engine = engine(config(1), &MockTransport::new(), &events);
    let queue = engine.queue();

    engine.start()?;
    engine.shutdown().await?;

    assert_eq!(queue.enqueue(task("https://a.example/hook")).unwrap_err(), QueueError::Closed);
    Ok(())
}

#[tokio::test]
async fn full_queue_rejects_without_blocking() -> Result<()> {
    let events = RecordingEventHandler::new();
    let config = EngineConfig { queue_capacity: 1, ..config(1) };
    let engine = engine(config, &MockTransport::new(), &events);
    let queue = engine.queue();

    queue.enqueue(task("https://a.example/hook"))?;
    let error = queue.enqueue(task("https://b.example/hook")).unwrap_err();

    assert_eq!(error, QueueError::Full { capacity: 1 });
    engine.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn start_twice_is_rejected() -> Result<()> {
    let events = RecordingEventHandler::new();
    let mut engine = engine(config(1), &MockTransport::new(), &events);

    engine.start()?;
    assert!(matches!(engine.start(), Err(DeliveryError::InternalError { .. })));

    engine.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn zero_workers_cannot_start() {
    let events = RecordingEventHandler::new();
    let mut engine = engine(config(0), &MockTransport::new(), &events);

    assert!(engine.start().is_err());
}

#[tokio::test]
async fn unstarted_shutdown_fails_queued_tasks() -> Result<()> {
    let transport = MockTransport::new();
    let events = RecordingEventHandler::new();
    let engine = engine(config(1), &transport, &events);
    let queue = engine.queue();

    queue.enqueue(task("https://a.example/hook"))?;
    queue.enqueue(task("https://b.example/hook"))?;
    engine.shutdown().await?;

    let terminal = events.terminal_events();
    assert_eq!(terminal.len(), 2);
    assert!(terminal.iter().all(|e| matches!(e, DeliveryEvent::Failed(f) if f.attempts == 0)));
    assert_eq!(transport.request_count(), 0);
    Ok(())
}

/// Panics when an attempt starts, records everything else.
#[derive(Debug, Default)]
struct PanicOnAttempt {
    events: RecordingEventHandler,
}

#[async_trait]
impl EventHandler for PanicOnAttempt {
    async fn handle_event(&self, event: DeliveryEvent) {
        if matches!(event, DeliveryEvent::AttemptStarted(_)) {
            panic!("handler failure");
        }
        self.events.handle_event(event).await;
    }
}

#[tokio::test]
async fn worker_panic_is_reported_at_shutdown() -> Result<()> {
    let transport = MockTransport::new();
    let handler = Arc::new(PanicOnAttempt::default());
    let mut engine = DeliveryEngine::with_transport(
        config(1),
        IntegrationRegistry::default(),
        Arc::new(transport.clone()),
    )
    .with_clock(Arc::new(TestClock::new()))
    .with_event_handler(handler.clone());
    let queue = engine.queue();

    queue.enqueue(task("https://a.example/hook"))?;
    queue.enqueue(task("https://b.example/hook"))?;
    engine.start()?;

    let result = engine.shutdown().await;
    assert!(
        matches!(result, Err(DeliveryError::WorkerPanic { worker_id: 0, .. })),
        "got {result:?}"
    );
    assert_eq!(transport.request_count(), 0);

    // The task left behind by the dead worker is failed, not lost.
    let terminal = handler.events.terminal_events();
    assert_eq!(terminal.len(), 1);
    assert!(matches!(&terminal[0], DeliveryEvent::Failed(f) if f.attempts == 0));
    Ok(())
}

#[tokio::test]
async fn shutdown_timeout_cancels_in_flight_and_fails_queued() -> Result<()> {
    let transport = MockTransport::scripted([Reply::Hang]);
    let events = RecordingEventHandler::new();
    let config = EngineConfig { shutdown_timeout: Duration::from_millis(100), ..config(1) };
    let mut engine = engine(config, &transport, &events);
    let queue = engine.queue();

    engine.start()?;
    queue.enqueue(task("https://hang.example/hook"))?;
    queue.enqueue(task("https://never.example/hook"))?;

    tokio::time::timeout(DEFAULT_EVENT_TIMEOUT, async {
        while transport.request_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    let result = engine.shutdown().await;
    assert!(matches!(result, Err(DeliveryError::ShutdownTimeout { .. })));

    let failed = events.wait_for_terminal(2, DEFAULT_EVENT_TIMEOUT).await;
    assert!(failed.iter().all(|e| matches!(e, DeliveryEvent::Failed(f) if !f.is_retryable)));
    assert_eq!(transport.request_count(), 1, "queued task must not be attempted");
    Ok(())
}
