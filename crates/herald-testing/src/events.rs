//! Delivery event recording for deterministic async assertions.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use herald_core::{DeliveryEvent, EventHandler, TaskId};
use tokio::sync::Notify;

/// Default bound for waiting on delivery outcomes in tests.
///
/// Generous enough for slow CI machines, short enough that a hung engine
/// fails the test instead of the suite.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Event handler that keeps every event it receives.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventHandler {
    events: Arc<Mutex<Vec<DeliveryEvent>>>,
    notify: Arc<Notify>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received, in order.
    pub fn events(&self) -> Vec<DeliveryEvent> {
        self.lock().clone()
    }

    /// Terminal events (`Succeeded`, `Skipped`, `Failed`) received.
    pub fn terminal_events(&self) -> Vec<DeliveryEvent> {
        self.lock().iter().filter(|event| event.is_terminal()).cloned().collect()
    }

    /// Events for one task.
    pub fn events_for(&self, task_id: TaskId) -> Vec<DeliveryEvent> {
        self.lock().iter().filter(|event| event.task_id() == task_id).cloned().collect()
    }

    /// Waits until at least `count` terminal events have been received.
    ///
    /// # Panics
    ///
    /// Panics if `timeout` elapses first.
    pub async fn wait_for_terminal(&self, count: usize, timeout: Duration) -> Vec<DeliveryEvent> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if self.terminal_events().len() >= count {
                    break;
                }
                notified.await;
            }
        })
        .await;

        if result.is_err() {
            panic!(
                "expected {count} terminal delivery events within {timeout:?}, got {}",
                self.terminal_events().len()
            );
        }

        self.terminal_events()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeliveryEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: DeliveryEvent) {
        self.lock().push(event);
        self.notify.notify_waiters();
    }
}
