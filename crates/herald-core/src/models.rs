//! Domain models and strongly-typed identifiers.
//!
//! Defines the immutable event payload, subscriber records and the plain-data
//! delivery target carried by every queued task. Everything here is
//! serializable so task descriptors can cross any queue substrate.

use std::{collections::BTreeSet, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::error::ValidationError;

/// Event attributes: string keys to arbitrary JSON values.
pub type Attributes = Map<String, Value>;

/// Strongly-typed delivery task identifier.
///
/// Stays the same across retries of one task, so receivers can use it to
/// deduplicate at-least-once deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Creates a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One event occurrence.
///
/// Immutable once constructed. Attributes sit behind an `Arc`, so cloning a
/// payload into every fanout task shares one allocation and needs no locking.
///
/// # Example
///
/// ```
/// use herald_core::models::EventPayload;
/// use serde_json::json;
///
/// let attributes = json!({"target": "web-01"}).as_object().cloned().unwrap_or_default();
/// let payload = EventPayload::new("scan.completed", attributes).unwrap();
/// assert_eq!(payload.name(), "scan.completed");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEventPayload")]
pub struct EventPayload {
    name: String,
    attributes: Arc<Attributes>,
    occurred_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawEventPayload {
    name: String,
    #[serde(default)]
    attributes: Attributes,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<RawEventPayload> for EventPayload {
    type Error = ValidationError;

    fn try_from(raw: RawEventPayload) -> Result<Self, Self::Error> {
        Self::at(raw.name, raw.attributes, raw.occurred_at)
    }
}

impl EventPayload {
    /// Creates a payload stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventName` if `name` is empty or only
    /// whitespace.
    pub fn new(name: impl Into<String>, attributes: Attributes) -> Result<Self, ValidationError> {
        Self::at(name, attributes, Utc::now())
    }

    /// Creates a payload with an explicit occurrence time.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyEventName` if `name` is empty or only
    /// whitespace.
    pub fn at(
        name: impl Into<String>,
        attributes: Attributes,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyEventName);
        }
        Ok(Self { name, attributes: Arc::new(attributes), occurred_at })
    }

    /// Event type name, e.g. `scan.completed`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event data.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Looks up a single top-level attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// When the event occurred.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// JSON body posted to webhook subscribers.
    ///
    /// The attributes flattened into one object with `event` set to the event
    /// name (overriding any attribute of that name) and `occurred_at` added
    /// as RFC 3339 unless an attribute already supplies it.
    pub fn wire_body(&self) -> Value {
        let mut body = (*self.attributes).clone();
        body.insert("event".to_string(), Value::String(self.name.clone()));
        body.entry("occurred_at")
            .or_insert_with(|| Value::String(self.occurred_at.to_rfc3339()));
        Value::Object(body)
    }
}

/// An external HTTP endpoint registered for some or all events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Absolute http(s) URL that receives the POST.
    pub post_url: String,

    /// Event names this subscriber wants. Empty means every event.
    #[serde(default, alias = "events")]
    pub event_filter: BTreeSet<String>,
}

impl Subscriber {
    /// Creates a subscriber for all events after validating its URL.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidPostUrl` if the URL is not a
    /// well-formed absolute http(s) URL.
    pub fn new(post_url: impl Into<String>) -> Result<Self, ValidationError> {
        let post_url = post_url.into();
        validate_post_url(&post_url)?;
        Ok(Self { post_url, event_filter: BTreeSet::new() })
    }

    /// Restricts the subscriber to the given event names.
    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_filter = events.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this subscriber wants the named event.
    pub fn accepts(&self, event_name: &str) -> bool {
        self.event_filter.is_empty() || self.event_filter.contains(event_name)
    }
}

/// Parses and checks a subscriber URL.
///
/// # Errors
///
/// Returns `ValidationError::InvalidPostUrl` when the URL does not parse, is
/// relative, has no host, or uses a scheme other than http/https.
pub fn validate_post_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw).map_err(|e| ValidationError::invalid_post_url(raw, e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::invalid_post_url(
            raw,
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::invalid_post_url(raw, "missing host"));
    }

    Ok(url)
}

/// Built-in notification channels, in their fixed fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Slack channel messages.
    Slack,
    /// Status board (pwnboard) host callbacks.
    StatusBoard,
    /// Generic webhook-style integration posting the raw event.
    CustomWebhook,
    /// Workplace chat thread messages.
    Workplace,
}

impl IntegrationKind {
    /// Every integration kind in fallback order.
    pub const ALL: [Self; 4] =
        [Self::Slack, Self::StatusBoard, Self::CustomWebhook, Self::Workplace];

    /// Stable identifier, also the configuration key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Slack => "slack",
            Self::StatusBoard => "status_board",
            Self::CustomWebhook => "custom_webhook",
            Self::Workplace => "workplace",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown integration: {s}"))
    }
}

/// Where a delivery task sends its payload.
///
/// A plain handle: webhook targets carry the URL string as the registry
/// returned it, integration targets carry only the kind. The worker resolves
/// the handle to a live adapter at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryTarget {
    /// A webhook subscriber endpoint.
    Webhook {
        /// URL to POST the event to
        post_url: String,
    },
    /// A built-in integration.
    Integration {
        /// Which integration to invoke
        integration: IntegrationKind,
    },
}

impl DeliveryTarget {
    /// Creates a webhook target.
    pub fn webhook(post_url: impl Into<String>) -> Self {
        Self::Webhook { post_url: post_url.into() }
    }

    /// Creates an integration target.
    pub fn integration(integration: IntegrationKind) -> Self {
        Self::Integration { integration }
    }
}

impl fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Webhook { post_url } => write!(f, "webhook:{post_url}"),
            Self::Integration { integration } => write!(f, "integration:{integration}"),
        }
    }
}
