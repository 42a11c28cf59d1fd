//! Queue that records what the dispatcher enqueues.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use herald_core::DeliveryTarget;
use herald_delivery::{DeliveryTask, QueueError, TaskHandle, TaskQueue};

/// In-memory [`TaskQueue`] for dispatcher tests.
///
/// Accepted tasks are kept in order. The queue can be switched to refuse
/// everything, or built to refuse after a fixed number of tasks.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    tasks: Arc<Mutex<Vec<DeliveryTask>>>,
    unavailable: Arc<AtomicBool>,
    limit: Option<usize>,
}

impl RecordingQueue {
    /// Creates an empty queue accepting every task.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue that accepts `accepted` tasks, then reports full.
    pub fn failing_after(accepted: usize) -> Self {
        Self { limit: Some(accepted), ..Self::default() }
    }

    /// Creates a queue that refuses every task.
    pub fn unavailable() -> Self {
        let queue = Self::new();
        queue.set_unavailable(true);
        queue
    }

    /// Makes subsequent enqueues fail with `QueueError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Accepted tasks, in enqueue order.
    pub fn tasks(&self) -> Vec<DeliveryTask> {
        self.lock().clone()
    }

    /// Targets of the accepted tasks.
    pub fn targets(&self) -> Vec<DeliveryTarget> {
        self.lock().iter().map(|task| task.target.clone()).collect()
    }

    /// Number of accepted tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was accepted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DeliveryTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskQueue for RecordingQueue {
    fn enqueue(&self, task: DeliveryTask) -> Result<TaskHandle, QueueError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(QueueError::Unavailable { message: "queue switched off".to_string() });
        }

        let mut tasks = self.lock();
        if let Some(limit) = self.limit {
            if tasks.len() >= limit {
                return Err(QueueError::Full { capacity: limit });
            }
        }

        let handle = TaskHandle { task_id: task.id, target: task.target.clone() };
        tasks.push(task);
        Ok(handle)
    }
}
