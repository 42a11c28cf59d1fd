//! Canned subscriber resolvers.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use herald_core::{LookupError, Subscriber};
use herald_dispatch::SubscriberResolver;

/// Resolver over a fixed subscriber list that counts lookups.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    subscribers: Vec<Subscriber>,
    lookups: Arc<AtomicUsize>,
}

impl StaticResolver {
    /// Resolver that never returns a subscriber.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolver over `subscribers`, in the given order.
    pub fn new(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        Self { subscribers: subscribers.into_iter().collect(), lookups: Arc::default() }
    }

    /// Resolver with one catch-all subscriber per URL.
    ///
    /// # Panics
    ///
    /// Panics if a URL is not a valid http(s) URL.
    pub fn with_urls<'a>(urls: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(urls.into_iter().map(|url| {
            Subscriber::new(url).unwrap_or_else(|e| panic!("invalid fixture url {url}: {e}"))
        }))
    }

    /// Number of `lookup` calls so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SubscriberResolver for StaticResolver {
    fn lookup(&self, event_name: &str) -> Result<Vec<Subscriber>, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.subscribers.iter().filter(|s| s.accepts(event_name)).cloned().collect())
    }
}

/// Resolver whose registry is always unreachable.
#[derive(Debug, Clone)]
pub struct UnavailableResolver {
    message: String,
}

impl UnavailableResolver {
    /// Fails every lookup with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl Default for UnavailableResolver {
    fn default() -> Self {
        Self::new("subscriber registry unreachable")
    }
}

impl SubscriberResolver for UnavailableResolver {
    fn lookup(&self, _event_name: &str) -> Result<Vec<Subscriber>, LookupError> {
        Err(LookupError::unavailable(self.message.clone()))
    }
}
