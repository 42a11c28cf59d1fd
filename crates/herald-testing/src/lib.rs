//! Test doubles and fixtures for deterministic herald tests.
//!
//! Provides a scripted [`MockTransport`], a [`RecordingQueue`] that keeps
//! enqueued tasks for inspection, canned subscriber resolvers, an event
//! recorder with bounded waits, and payload builders. Nothing here opens a
//! socket; pair the transport with [`TestClock`] to run retry schedules
//! without sleeping.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod fixtures;
pub mod queue;
pub mod resolver;
pub mod transport;

pub use events::{RecordingEventHandler, DEFAULT_EVENT_TIMEOUT};
pub use fixtures::EventBuilder;
pub use herald_core::TestClock;
pub use queue::RecordingQueue;
pub use resolver::{StaticResolver, UnavailableResolver};
pub use transport::{MockTransport, Reply};
