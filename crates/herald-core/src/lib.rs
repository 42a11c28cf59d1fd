//! Core domain types for event fanout delivery.
//!
//! Provides the immutable event payload, subscriber records, delivery target
//! descriptors, delivery outcome events and the clock abstraction shared by
//! the delivery and dispatch crates. Nothing in here performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{LookupError, ValidationError};
pub use events::{
    DeliveryAttemptStartedEvent, DeliveryEvent, DeliveryFailedEvent, DeliverySkippedEvent,
    DeliverySucceededEvent, EventHandler, MulticastEventHandler, NoOpEventHandler,
    RetryScheduledEvent,
};
pub use models::{
    Attributes, DeliveryTarget, EventPayload, IntegrationKind, Subscriber, TaskId,
};
pub use time::{Clock, RealClock, TestClock};
