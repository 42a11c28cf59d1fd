//! Task queue contract and the in-process channel queue.
//!
//! The dispatcher hands serializable [`DeliveryTask`] descriptors to a
//! [`TaskQueue`] and gets a [`TaskHandle`] back. [`ChannelQueue`] is the
//! bounded in-process implementation feeding the worker pool; any other
//! substrate only has to honor the same `enqueue` contract.

use std::sync::{Arc, PoisonError, RwLock};

use herald_core::{DeliveryTarget, TaskId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{stats::StatsRecorder, task::DeliveryTask};

/// Receipt for an enqueued task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    /// Identifier of the enqueued task.
    pub task_id: TaskId,
    /// Where the task delivers to.
    pub target: DeliveryTarget,
}

/// The queue refused a task.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No room left.
    #[error("task queue full (capacity {capacity})")]
    Full {
        /// Queue capacity
        capacity: usize,
    },

    /// The queue no longer accepts tasks.
    #[error("task queue closed")]
    Closed,

    /// The backing substrate is unreachable.
    #[error("task queue unavailable: {message}")]
    Unavailable {
        /// Description of the failure
        message: String,
    },
}

/// Accepts delivery tasks for asynchronous, at-least-once execution.
///
/// `enqueue` must not block: it either accepts the task or fails right away.
pub trait TaskQueue: Send + Sync + std::fmt::Debug {
    /// Enqueues a task.
    ///
    /// # Errors
    ///
    /// Returns `QueueError` if the task was not accepted.
    fn enqueue(&self, task: DeliveryTask) -> Result<TaskHandle, QueueError>;
}

/// Receiving half shared by the workers.
pub type TaskReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DeliveryTask>>>;

/// Bounded in-process queue backed by a tokio channel.
#[derive(Debug)]
pub struct ChannelQueue {
    sender: RwLock<Option<mpsc::Sender<DeliveryTask>>>,
    capacity: usize,
    stats: Arc<StatsRecorder>,
}

impl ChannelQueue {
    /// Creates a queue and the receiver its workers drain.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize, stats: Arc<StatsRecorder>) -> (Self, TaskReceiver) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        let queue = Self { sender: RwLock::new(Some(sender)), capacity, stats };
        (queue, Arc::new(tokio::sync::Mutex::new(receiver)))
    }

    /// Stops accepting tasks. Already queued tasks stay receivable, and the
    /// receiver reports end of stream once they are drained.
    pub fn close(&self) {
        self.sender.write().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.sender.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    /// Maximum number of queued tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl TaskQueue for ChannelQueue {
    fn enqueue(&self, task: DeliveryTask) -> Result<TaskHandle, QueueError> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(QueueError::Closed)?;

        let handle = TaskHandle { task_id: task.id, target: task.target.clone() };
        match sender.try_send(task) {
            Ok(()) => {
                self.stats.task_queued();
                Ok(handle)
            },
            Err(TrySendError::Full(_)) => Err(QueueError::Full { capacity: self.capacity }),
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }
}
