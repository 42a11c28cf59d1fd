//! Event fanout.
//!
//! A trigger resolves subscribers and enqueues one [`DeliveryTask`] per
//! subscriber. When nobody subscribed, the event goes to every enabled
//! integration instead, in the registry's fixed order. Webhooks and
//! integrations never both receive the same trigger.
//!
//! ```text
//! trigger(event) ─▶ lookup(name) ─┬─ N > 0 ─▶ N webhook tasks ──┐
//!                                 └─ N = 0 ─▶ enabled integrations ─▶ TaskQueue
//! ```

use std::{fmt, sync::Arc};

use herald_core::{Attributes, DeliveryTarget, EventPayload, ValidationError};
use herald_delivery::{DeliveryTask, IntegrationRegistry, TaskHandle, TaskQueue};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    error::{DispatchError, Result},
    resolver::SubscriberResolver,
};

/// Which fanout path a trigger took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// One task per matching subscriber.
    Webhooks,
    /// No subscribers; one task per enabled integration.
    Integrations,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhooks => write!(f, "webhooks"),
            Self::Integrations => write!(f, "integrations"),
        }
    }
}

/// What a successful trigger enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Event name.
    pub event: String,
    /// Fanout path taken.
    pub route: Route,
    /// One handle per enqueued task, in enqueue order.
    pub handles: Vec<TaskHandle>,
}

impl DispatchReport {
    /// Number of tasks enqueued.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }
}

/// Fans events out into delivery tasks.
///
/// Holds no mutable state; share it freely across threads.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    resolver: Arc<dyn SubscriberResolver>,
    integrations: Arc<IntegrationRegistry>,
    queue: Arc<dyn TaskQueue>,
    max_attempts: Option<u32>,
}

impl Dispatcher {
    /// Creates a dispatcher.
    pub fn new(
        resolver: Arc<dyn SubscriberResolver>,
        integrations: Arc<IntegrationRegistry>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self { resolver, integrations, queue, max_attempts: None }
    }

    /// Sets the attempt budget of every task this dispatcher creates.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Builds a payload from a name and attributes and triggers it.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::trigger`].
    pub fn trigger_event(
        &self,
        name: impl Into<String>,
        attributes: Attributes,
    ) -> Result<DispatchReport> {
        let name = name.into();
        let payload = EventPayload::new(name.as_str(), attributes).map_err(|e| {
            warn!(event = %name, error = %e, "rejected event");
            e
        })?;
        self.trigger(payload)
    }

    /// Resolves subscribers for the event and enqueues its delivery tasks.
    ///
    /// Returns once every task is enqueued; delivery happens on the engine's
    /// workers and its outcome never reaches the caller.
    ///
    /// # Errors
    ///
    /// - `Validation` if the event name is empty. Nothing is enqueued.
    /// - `Lookup` if the registry is unreachable. The event is dropped.
    /// - `Enqueue` if the queue refuses a task. Tasks enqueued before the
    ///   failure stay queued; the rest are not attempted.
    pub fn trigger(&self, payload: EventPayload) -> Result<DispatchReport> {
        if payload.name().trim().is_empty() {
            return Err(ValidationError::EmptyEventName.into());
        }

        let subscribers = self.resolver.lookup(payload.name()).map_err(|e| {
            error!(event = %payload.name(), error = %e, "subscriber lookup failed, dropping event");
            DispatchError::Lookup(e)
        })?;

        let (route, targets): (Route, Vec<DeliveryTarget>) = if subscribers.is_empty() {
            let targets = self
                .integrations
                .enabled()
                .map(|adapter| DeliveryTarget::integration(adapter.kind()))
                .collect();
            (Route::Integrations, targets)
        } else {
            let targets = subscribers
                .into_iter()
                .map(|subscriber| DeliveryTarget::webhook(subscriber.post_url))
                .collect();
            (Route::Webhooks, targets)
        };

        if targets.is_empty() {
            debug!(event = %payload.name(), "no subscribers and no enabled integrations");
        }

        let total = targets.len();
        let mut handles = Vec::with_capacity(total);

        for target in targets {
            let mut task = DeliveryTask::new(target, payload.clone());
            if let Some(max_attempts) = self.max_attempts {
                task = task.with_max_attempts(max_attempts);
            }

            match self.queue.enqueue(task) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    error!(
                        event = %payload.name(),
                        enqueued = handles.len(),
                        total,
                        error = %source,
                        "failed to enqueue delivery task"
                    );
                    return Err(DispatchError::Enqueue { source, enqueued: handles.len(), total });
                },
            }
        }

        info!(event = %payload.name(), %route, tasks = handles.len(), "event dispatched");

        Ok(DispatchReport { event: payload.name().to_string(), route, handles })
    }
}
