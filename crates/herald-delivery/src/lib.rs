//! Asynchronous delivery of fanout tasks.
//!
//! The dispatcher turns one event into independent [`DeliveryTask`]s and hands
//! them to a [`TaskQueue`]. This crate executes them: workers pull tasks off
//! the queue, resolve the target (a webhook URL or a built-in integration)
//! into an HTTP request, and retry transport failures with exponential
//! backoff until the task succeeds or runs out of attempts.
//!
//! # Architecture
//!
//! 1. **Queue** - bounded channel of serializable task descriptors
//! 2. **Prepare** - validate the webhook URL or render the integration
//!    message; unusable targets fail without consuming an attempt
//! 3. **Attempt** - one POST with bounded connect/read timeouts
//! 4. **Backoff** - retryable failures sleep, then attempt again
//!
//! Every state change is published as a [`herald_core::DeliveryEvent`].
//!
//! # Example
//!
//! ```no_run
//! use herald_delivery::{DeliveryEngine, EngineConfig, IntegrationRegistry};
//!
//! # async fn example() -> herald_delivery::Result<()> {
//! let mut engine = DeliveryEngine::new(EngineConfig::default(), IntegrationRegistry::default())?;
//! let queue = engine.queue();
//! engine.start()?;
//!
//! // hand `queue` to the dispatcher ...
//! # drop(queue);
//!
//! engine.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engine;
pub mod error;
pub mod integrations;
pub mod queue;
pub mod retry;
pub mod stats;
pub mod task;
pub mod worker;
mod worker_pool;

pub use client::{ClientConfig, DeliveryClient, OutboundRequest, Transport, TransportResponse};
pub use engine::{DeliveryEngine, EngineConfig};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use integrations::{Channel, DeliveryOutcome, IntegrationAdapter, IntegrationRegistry, Rendered};
pub use queue::{ChannelQueue, QueueError, TaskHandle, TaskQueue};
pub use retry::{RetryContext, RetryDecision, RetryPolicy};
pub use stats::EngineStats;
pub use task::{DeliveryTask, TaskState, TaskTransition};
pub use worker::TaskExecutor;

/// Default number of concurrent delivery workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default task queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Header carrying the event name on webhook posts.
pub const EVENT_HEADER: &str = "X-Herald-Event";

/// Header carrying the task ID, stable across retries.
pub const TASK_ID_HEADER: &str = "X-Herald-Task-Id";

/// Header carrying the 1-based attempt number.
pub const ATTEMPT_HEADER: &str = "X-Herald-Delivery-Attempt";
