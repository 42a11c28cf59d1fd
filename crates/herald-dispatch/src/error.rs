//! Errors returned to the `trigger` caller.

use herald_core::{LookupError, ValidationError};
use herald_delivery::QueueError;
use thiserror::Error;

/// Why a trigger did not fan out completely.
///
/// Only the synchronous part of a trigger can fail. Delivery outcomes are
/// reported through delivery events and never reach the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event itself is unusable. Nothing was enqueued.
    #[error("invalid event: {0}")]
    Validation(#[from] ValidationError),

    /// The subscriber registry could not be read. The event is dropped.
    #[error("subscriber lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// The queue refused a task part way through the fanout.
    #[error("enqueue failed after {enqueued} of {total} tasks: {source}")]
    Enqueue {
        /// Queue failure
        #[source]
        source: QueueError,
        /// Tasks accepted before the failure; they will still be delivered
        enqueued: usize,
        /// Tasks the fanout would have produced
        total: usize,
    },
}

impl DispatchError {
    /// Number of tasks already accepted when the trigger failed.
    pub fn enqueued(&self) -> usize {
        match self {
            Self::Enqueue { enqueued, .. } => *enqueued,
            Self::Validation(_) | Self::Lookup(_) => 0,
        }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
