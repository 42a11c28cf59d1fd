//! Test data builders.
//!
//! Builders panic on invalid input so tests stay short; use the real
//! constructors when the error path is what is under test.

use chrono::{DateTime, Utc};
use herald_core::{Attributes, EventPayload, Subscriber};
use serde_json::{json, Value};

/// Builder for [`EventPayload`]s.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    name: String,
    attributes: Attributes,
    occurred_at: DateTime<Utc>,
}

impl EventBuilder {
    /// Starts a payload for the named event with no attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Attributes::new(), occurred_at: Utc::now() }
    }

    /// Sets one attribute.
    #[must_use]
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Merges every key of a JSON object into the attributes.
    ///
    /// # Panics
    ///
    /// Panics if `attributes` is not an object.
    #[must_use]
    pub fn attributes(mut self, attributes: Value) -> Self {
        let Value::Object(map) = attributes else {
            panic!("event attributes must be a JSON object, got {attributes}");
        };
        self.attributes.extend(map);
        self
    }

    /// Sets the occurrence time.
    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Builds the payload.
    ///
    /// # Panics
    ///
    /// Panics if the event name is empty.
    pub fn build(self) -> EventPayload {
        EventPayload::at(self.name, self.attributes, self.occurred_at)
            .unwrap_or_else(|e| panic!("invalid fixture event: {e}"))
    }
}

/// A `logged_error` event with a fully populated log entry.
pub fn logged_error(message: &str) -> EventPayload {
    EventBuilder::new("logged_error")
        .attribute(
            "log",
            json!({
                "level": "ERROR",
                "timestamp": 1_714_564_800,
                "application": "teamserver",
                "message": message,
            }),
        )
        .build()
}

/// An `action_complete` event for the given action id.
pub fn action_complete(action_id: &str) -> EventPayload {
    EventBuilder::new("action_complete")
        .attribute(
            "action",
            json!({
                "action_id": action_id,
                "status": "complete",
                "target_name": "web-01",
                "action_string": "exec whoami",
            }),
        )
        .build()
}

/// A `session_checkin` event reporting the given addresses on one interface.
pub fn session_checkin(ip_addrs: &[&str]) -> EventPayload {
    EventBuilder::new("session_checkin")
        .attribute("session", json!({"agent_version": "implant-2.1"}))
        .attribute(
            "target",
            json!({"facts": {"interfaces": [{"name": "eth0", "ip_addrs": ip_addrs}]}}),
        )
        .build()
}

/// A catch-all subscriber.
///
/// # Panics
///
/// Panics if `post_url` is not a valid http(s) URL.
pub fn subscriber(post_url: &str) -> Subscriber {
    Subscriber::new(post_url).unwrap_or_else(|e| panic!("invalid fixture url {post_url}: {e}"))
}

/// A subscriber whose URL was never validated, as it would arrive from an
/// external registry.
pub fn unchecked_subscriber(post_url: &str) -> Subscriber {
    Subscriber { post_url: post_url.to_string(), event_filter: Default::default() }
}
