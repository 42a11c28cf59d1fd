//! Delivery outcome events.
//!
//! Workers publish one event per state change of a delivery task. Handlers
//! observe outcomes (logging, metrics, audit) without the delivery path
//! knowing who listens, and the original `trigger` caller never sees them.
//!
//! ```text
//!                 AttemptStarted / Succeeded / Skipped /
//! ┌─────────────┐   RetryScheduled / Failed            ┌────────────────────┐
//! │ TaskExecutor│ ────────────────────────────────────▶│ MulticastHandler   │
//! └─────────────┘                                      └────────────────────┘
//!                                                        │        │
//!                                                        ▼        ▼
//!                                                   handler A  handler B
//! ```

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DeliveryTarget, TaskId};

/// Events emitted by delivery workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeliveryEvent {
    /// An attempt is about to be sent.
    AttemptStarted(DeliveryAttemptStartedEvent),

    /// The target accepted the event. Terminal.
    Succeeded(DeliverySucceededEvent),

    /// The integration declined the event as not relevant. Terminal.
    Skipped(DeliverySkippedEvent),

    /// The attempt failed and another one is scheduled.
    RetryScheduled(RetryScheduledEvent),

    /// Delivery gave up. Terminal.
    Failed(DeliveryFailedEvent),
}

impl DeliveryEvent {
    /// Task the event belongs to.
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::AttemptStarted(e) => e.task_id,
            Self::Succeeded(e) => e.task_id,
            Self::Skipped(e) => e.task_id,
            Self::RetryScheduled(e) => e.task_id,
            Self::Failed(e) => e.task_id,
        }
    }

    /// Whether the task reached a final state with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Skipped(_) | Self::Failed(_))
    }
}

/// Emitted right before an attempt goes out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttemptStartedEvent {
    /// Task being delivered.
    pub task_id: TaskId,
    /// Event name.
    pub event_name: String,
    /// Delivery target.
    pub target: DeliveryTarget,
    /// Attempt number (1-based).
    pub attempt_number: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
}

/// Emitted when a target accepts the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySucceededEvent {
    /// Task that was delivered.
    pub task_id: TaskId,
    /// Event name.
    pub event_name: String,
    /// Delivery target.
    pub target: DeliveryTarget,
    /// HTTP status returned by the target.
    pub response_status: u16,
    /// Attempt that succeeded (1-based).
    pub attempt_number: u32,
    /// When the delivery completed.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when an integration does not handle the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySkippedEvent {
    /// Task that was skipped.
    pub task_id: TaskId,
    /// Event name.
    pub event_name: String,
    /// Delivery target.
    pub target: DeliveryTarget,
    /// Why nothing was sent.
    pub reason: String,
}

/// Emitted when a failed attempt will be retried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryScheduledEvent {
    /// Task being retried.
    pub task_id: TaskId,
    /// Event name.
    pub event_name: String,
    /// Delivery target.
    pub target: DeliveryTarget,
    /// Attempt that failed (1-based).
    pub attempt_number: u32,
    /// Backoff before the next attempt.
    pub delay: Duration,
    /// Error from the failed attempt.
    pub error_message: String,
}

/// Emitted when a task gives up for good.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailedEvent {
    /// Task that failed.
    pub task_id: TaskId,
    /// Event name.
    pub event_name: String,
    /// Delivery target.
    pub target: DeliveryTarget,
    /// Attempts consumed. Zero when the target was unusable.
    pub attempts: u32,
    /// When the task failed.
    pub failed_at: DateTime<Utc>,
    /// Error that ended the task.
    pub error_message: String,
    /// Whether the last error was itself retryable (true means the attempt
    /// budget ran out).
    pub is_retryable: bool,
}

/// Trait for handling delivery events.
///
/// Implementations must not block delivery processing and must swallow their
/// own failures.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a delivery event.
    async fn handle_event(&self, event: DeliveryEvent);
}

/// Event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DeliveryEvent) {}
}

/// Forwards every event to all registered handlers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a multicast handler with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered handlers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::IntegrationKind;

    #[derive(Debug)]
    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl EventHandler for CountingHandler {
        async fn handle_event(&self, _event: DeliveryEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn skipped_event() -> DeliveryEvent {
        DeliveryEvent::Skipped(DeliverySkippedEvent {
            task_id: TaskId::new(),
            event_name: "scan.completed".to_string(),
            target: DeliveryTarget::integration(IntegrationKind::StatusBoard),
            reason: "event not handled".to_string(),
        })
    }

    #[tokio::test]
    async fn multicast_handler_forwards_to_all_subscribers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut multicast = MulticastEventHandler::new();
        multicast.add_subscriber(Arc::new(CountingHandler { count: counter.clone() }));
        multicast.add_subscriber(Arc::new(CountingHandler { count: counter.clone() }));
        assert_eq!(multicast.subscriber_count(), 2);

        multicast.handle_event(skipped_event()).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_multicast_is_a_no_op() {
        MulticastEventHandler::new().handle_event(skipped_event()).await;
        NoOpEventHandler.handle_event(skipped_event()).await;
    }

    #[test]
    fn terminal_events_identified() {
        let event = skipped_event();
        assert!(event.is_terminal());

        let retry = DeliveryEvent::RetryScheduled(RetryScheduledEvent {
            task_id: event.task_id(),
            event_name: "scan.completed".to_string(),
            target: DeliveryTarget::webhook("https://a.example/hook"),
            attempt_number: 1,
            delay: Duration::from_secs(1),
            error_message: "server error: HTTP 503".to_string(),
        });
        assert!(!retry.is_terminal());
        assert_eq!(retry.task_id(), event.task_id());
    }
}
