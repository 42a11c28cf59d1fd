//! Subscriber lookup.
//!
//! [`SubscriberResolver`] is the boundary to whatever stores subscriptions.
//! [`InMemorySubscriberRegistry`] is the process-local implementation seeded
//! from configuration. Writers swap in a new list; readers clone the current
//! `Arc`, so a lookup always sees one consistent snapshot.

use std::sync::{Arc, PoisonError, RwLock};

use herald_core::{LookupError, Subscriber};
use tracing::debug;

/// Maps an event name to the subscribers that want it.
pub trait SubscriberResolver: Send + Sync + std::fmt::Debug {
    /// Subscribers for `event_name`, in registry order.
    ///
    /// A subscriber is included iff its event filter is empty or contains the
    /// name. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns `LookupError` if the registry cannot be read.
    fn lookup(&self, event_name: &str) -> Result<Vec<Subscriber>, LookupError>;
}

/// Copy-on-write subscriber list.
#[derive(Debug, Default)]
pub struct InMemorySubscriberRegistry {
    subscribers: RwLock<Arc<Vec<Subscriber>>>,
}

impl InMemorySubscriberRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding `subscribers` in order.
    ///
    /// Later entries for an already present URL replace the earlier one.
    pub fn from_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let registry = Self::new();
        for subscriber in subscribers {
            registry.register(subscriber);
        }
        registry
    }

    /// Adds a subscriber, or replaces the one with the same URL in place.
    pub fn register(&self, subscriber: Subscriber) {
        let mut guard = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);

        match next.iter_mut().find(|existing| existing.post_url == subscriber.post_url) {
            Some(existing) => *existing = subscriber,
            None => next.push(subscriber),
        }

        *guard = Arc::new(next);
    }

    /// Removes the subscriber with the given URL. Returns whether one existed.
    pub fn unregister(&self, post_url: &str) -> bool {
        let mut guard = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        if !guard.iter().any(|s| s.post_url == post_url) {
            return false;
        }

        let next = guard.iter().filter(|s| s.post_url != post_url).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    /// The current subscriber list.
    pub fn snapshot(&self) -> Arc<Vec<Subscriber>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl SubscriberResolver for InMemorySubscriberRegistry {
    fn lookup(&self, event_name: &str) -> Result<Vec<Subscriber>, LookupError> {
        let snapshot = self.snapshot();
        let matched: Vec<Subscriber> =
            snapshot.iter().filter(|s| s.accepts(event_name)).cloned().collect();

        debug!(
            event = event_name,
            registered = snapshot.len(),
            matched = matched.len(),
            "resolved subscribers"
        );
        Ok(matched)
    }
}
