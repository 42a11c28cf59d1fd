//! Event fanout for herald.
//!
//! [`Dispatcher::trigger`] validates an event, resolves its subscribers
//! through a [`SubscriberResolver`], and enqueues one delivery task per
//! subscriber, or per enabled integration when nobody subscribed. It never
//! waits on delivery. [`Config`] loads the layered service configuration
//! that wires the dispatcher to a delivery engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod resolver;

pub use config::Config;
pub use dispatcher::{DispatchReport, Dispatcher, Route};
pub use error::{DispatchError, Result};
pub use resolver::{InMemorySubscriberRegistry, SubscriberResolver};
