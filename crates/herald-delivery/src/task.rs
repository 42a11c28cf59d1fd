//! Delivery task descriptor and its retry state machine.
//!
//! ```text
//! Pending ──▶ InFlight ──▶ Succeeded
//!                │  ▲
//!                ▼  │ (after backoff)
//!             Retrying
//!                │
//!                ▼
//!              Failed
//! ```
//!
//! A target that cannot be used at all goes from `Pending` straight to
//! `Failed` without consuming an attempt.

use std::fmt;

use chrono::{DateTime, Utc};
use herald_core::{DeliveryTarget, EventPayload, TaskId};
use serde::{Deserialize, Serialize};

use crate::{
    error::DeliveryError,
    retry::{RetryContext, RetryDecision, RetryPolicy},
};

/// Default attempt budget per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Lifecycle state of a delivery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, never attempted.
    Pending,
    /// An attempt is in progress.
    InFlight,
    /// Last attempt failed, waiting out the backoff.
    Retrying,
    /// Target accepted the payload.
    Succeeded,
    /// Gave up.
    Failed,
}

impl TaskState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Retrying => write!(f, "retrying"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What happens after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTransition {
    /// Wait, then attempt again.
    Retry {
        /// Backoff before the next attempt
        delay: std::time::Duration,
    },
    /// The task is now `Failed`.
    Failed {
        /// Why the task gave up
        reason: String,
    },
}

/// One delivery of one payload to one target.
///
/// Plain serializable data: it owns its target handle and shares the
/// immutable payload, so tasks never share mutable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryTask {
    /// Stable identifier across retries.
    pub id: TaskId,
    /// Where the payload goes.
    pub target: DeliveryTarget,
    /// What is delivered.
    pub payload: EventPayload,
    /// Attempts made so far.
    pub attempt: u32,
    /// Attempt budget.
    pub max_attempts: u32,
    /// Current state.
    pub state: TaskState,
    /// When the dispatcher created the task.
    pub created_at: DateTime<Utc>,
    /// Most recent failure, if any.
    pub last_error: Option<String>,
}

impl DeliveryTask {
    /// Creates a pending task with the default attempt budget.
    pub fn new(target: DeliveryTarget, payload: EventPayload) -> Self {
        Self {
            id: TaskId::new(),
            target,
            payload,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            state: TaskState::Pending,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    /// Overrides the attempt budget. Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Event name of the payload.
    pub fn event_name(&self) -> &str {
        self.payload.name()
    }

    /// Whether the task has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Starts the next attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.state = TaskState::InFlight;
        self.attempt
    }

    /// Marks the in-flight attempt as accepted.
    pub fn succeed(&mut self) {
        self.state = TaskState::Succeeded;
        self.last_error = None;
    }

    /// Records a failed attempt and decides the next state.
    ///
    /// The task's own `max_attempts` overrides the one in `policy`.
    pub fn record_failure(
        &mut self,
        error: &DeliveryError,
        policy: &RetryPolicy,
    ) -> TaskTransition {
        self.last_error = Some(error.to_string());

        let policy = RetryPolicy { max_attempts: self.max_attempts, ..policy.clone() };
        match RetryContext::new(self.attempt, error, &policy).decide_retry() {
            RetryDecision::Retry { delay } => {
                self.state = TaskState::Retrying;
                TaskTransition::Retry { delay }
            },
            RetryDecision::GiveUp { reason } => {
                self.state = TaskState::Failed;
                TaskTransition::Failed { reason }
            },
        }
    }

    /// Fails the task before any attempt, e.g. for an unusable target.
    pub fn fail_without_attempt(&mut self, error: &DeliveryError) {
        self.state = TaskState::Failed;
        self.last_error = Some(error.to_string());
    }

    /// Fails the task because its worker is shutting down.
    pub fn abandon(&mut self) {
        self.state = TaskState::Failed;
        self.last_error = Some(DeliveryError::ShutdownRequested.to_string());
    }
}
