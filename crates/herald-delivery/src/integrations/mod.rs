//! Built-in notification integrations.
//!
//! Each integration is a closed variant of [`Channel`] that turns a generic
//! [`EventPayload`] into its own wire request. [`IntegrationAdapter`] wraps
//! one channel with its enabled state, and [`IntegrationRegistry`] holds one
//! adapter per [`IntegrationKind`] in fallback order, so callers iterate
//! generically and never branch on the concrete channel.
//!
//! Configuration is an opaque JSON table per integration. A missing table,
//! a missing or false `enabled` flag, malformed settings, and missing
//! credentials all leave the integration disabled.

mod custom_webhook;
pub mod messages;
mod slack;
mod status_board;
mod workplace;

use std::{collections::HashMap, fmt, path::Path};

use herald_core::{EventPayload, IntegrationKind};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

pub use self::{
    custom_webhook::{CustomWebhookChannel, CustomWebhookConfig},
    slack::{SlackChannel, SlackConfig},
    status_board::{StatusBoardChannel, StatusBoardConfig},
    workplace::{WorkplaceChannel, WorkplaceConfig},
};
use crate::{
    client::{OutboundRequest, Transport, TransportResponse},
    error::{DeliveryError, Result},
};

/// What an integration makes of one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// Send this request.
    Send(OutboundRequest),
    /// Nothing to send; the event is not relevant to this integration.
    Skip(String),
}

/// Result of one successful delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target accepted the message.
    Delivered {
        /// HTTP status returned
        status_code: u16,
    },
    /// The event was not relevant to the integration.
    Skipped {
        /// Why nothing was sent
        reason: String,
    },
}

/// A configured integration channel.
#[derive(Debug, Clone)]
pub enum Channel {
    /// Slack `chat.postMessage`.
    Slack(SlackChannel),
    /// Status board host callbacks.
    StatusBoard(StatusBoardChannel),
    /// Raw event webhook.
    CustomWebhook(CustomWebhookChannel),
    /// Workplace chat thread messages.
    Workplace(WorkplaceChannel),
}

impl Channel {
    /// Builds the channel for `kind` from its configuration table.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when the table does not deserialize or
    /// required settings (URL, credentials) are missing or invalid.
    pub fn from_config(kind: IntegrationKind, config: &Value) -> Result<Self> {
        match kind {
            IntegrationKind::Slack => {
                SlackChannel::from_config(parse_config(kind, config)?).map(Self::Slack)
            },
            IntegrationKind::StatusBoard => {
                StatusBoardChannel::from_config(parse_config(kind, config)?).map(Self::StatusBoard)
            },
            IntegrationKind::CustomWebhook => {
                CustomWebhookChannel::from_config(parse_config(kind, config)?)
                    .map(Self::CustomWebhook)
            },
            IntegrationKind::Workplace => {
                WorkplaceChannel::from_config(parse_config(kind, config)?).map(Self::Workplace)
            },
        }
    }

    /// Kind of this channel.
    pub fn kind(&self) -> IntegrationKind {
        match self {
            Self::Slack(_) => IntegrationKind::Slack,
            Self::StatusBoard(_) => IntegrationKind::StatusBoard,
            Self::CustomWebhook(_) => IntegrationKind::CustomWebhook,
            Self::Workplace(_) => IntegrationKind::Workplace,
        }
    }

    fn render(&self, payload: &EventPayload) -> Result<Rendered> {
        match self {
            Self::Slack(channel) => channel.render(payload),
            Self::StatusBoard(channel) => Ok(channel.render(payload)),
            Self::CustomWebhook(channel) => Ok(channel.render(payload)),
            Self::Workplace(channel) => channel.render(payload),
        }
    }

    fn check_response(&self, response: &TransportResponse) -> Result<()> {
        match self {
            Self::Slack(channel) => channel.check_response(response),
            Self::StatusBoard(_) | Self::CustomWebhook(_) | Self::Workplace(_) => Ok(()),
        }
    }
}

/// One integration and whether it is enabled.
#[derive(Debug, Clone)]
pub struct IntegrationAdapter {
    kind: IntegrationKind,
    channel: Option<Channel>,
}

impl IntegrationAdapter {
    /// Creates an enabled adapter around a configured channel.
    pub fn enabled(channel: Channel) -> Self {
        Self { kind: channel.kind(), channel: Some(channel) }
    }

    /// Creates a disabled adapter.
    pub fn disabled(kind: IntegrationKind) -> Self {
        Self { kind, channel: None }
    }

    /// Builds an adapter from an optional configuration table.
    ///
    /// Never fails: anything short of an enabled, valid configuration yields
    /// a disabled adapter, with a warning when the table was malformed.
    pub fn from_config(kind: IntegrationKind, config: Option<&Value>) -> Self {
        let Some(config) = config else {
            debug!(integration = %kind, "integration not configured");
            return Self::disabled(kind);
        };

        if !enabled_flag(config) {
            debug!(integration = %kind, "integration disabled");
            return Self::disabled(kind);
        }

        match Channel::from_config(kind, config) {
            Ok(channel) => Self::enabled(channel),
            Err(error) => {
                warn!(integration = %kind, error = %error, "integration misconfigured, disabling");
                Self::disabled(kind)
            },
        }
    }

    /// Integration kind.
    pub fn kind(&self) -> IntegrationKind {
        self.kind
    }

    /// Whether the integration receives events.
    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Translates the event into this integration's wire request.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for a disabled integration or a handled
    /// event the configuration has no destination for, and `InvalidPayload`
    /// when the event lacks data the message needs.
    pub fn render(&self, payload: &EventPayload) -> Result<Rendered> {
        self.channel()?.render(payload)
    }

    /// Inspects a 2xx response for API-level refusals.
    ///
    /// # Errors
    ///
    /// Returns `Rejected` (or `RateLimited`) when the integration API reports
    /// failure inside a successful HTTP response.
    pub fn check_response(&self, response: &TransportResponse) -> Result<()> {
        self.channel()?.check_response(response)
    }

    /// Delivers one event in a single attempt.
    ///
    /// This is the attempt the worker makes for integration targets; retries
    /// are the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns the render error, the transport error, the non-2xx status
    /// mapped to its retryable error, or the API-level refusal.
    pub async fn deliver(
        &self,
        payload: &EventPayload,
        transport: &dyn Transport,
    ) -> Result<DeliveryOutcome> {
        let request = match self.render(payload)? {
            Rendered::Send(request) => request,
            Rendered::Skip(reason) => return Ok(DeliveryOutcome::Skipped { reason }),
        };

        let response = transport.post(&request).await?.error_for_status()?;
        self.check_response(&response)?;

        Ok(DeliveryOutcome::Delivered { status_code: response.status_code })
    }

    fn channel(&self) -> Result<&Channel> {
        self.channel.as_ref().ok_or_else(|| {
            DeliveryError::configuration(format!("{} integration is disabled", self.kind))
        })
    }
}

/// One adapter per integration kind, in fixed fallback order.
#[derive(Debug, Clone)]
pub struct IntegrationRegistry {
    adapters: Vec<IntegrationAdapter>,
}

impl IntegrationRegistry {
    /// Builds every integration from a map of name to configuration table.
    ///
    /// Unknown names are logged and ignored.
    pub fn from_config<S: std::hash::BuildHasher>(configs: &HashMap<String, Value, S>) -> Self {
        for name in configs.keys() {
            if name.parse::<IntegrationKind>().is_err() {
                warn!(integration = %name, "ignoring configuration for unknown integration");
            }
        }

        Self::from_adapters(
            IntegrationKind::ALL
                .into_iter()
                .map(|kind| IntegrationAdapter::from_config(kind, configs.get(kind.as_str()))),
        )
    }

    /// Builds a registry from explicit adapters.
    ///
    /// Kinds without an adapter are disabled. A later adapter for the same
    /// kind replaces an earlier one.
    pub fn from_adapters(adapters: impl IntoIterator<Item = IntegrationAdapter>) -> Self {
        let mut slots: Vec<IntegrationAdapter> =
            IntegrationKind::ALL.into_iter().map(IntegrationAdapter::disabled).collect();

        for adapter in adapters {
            if let Some(slot) = slots.iter_mut().find(|slot| slot.kind == adapter.kind) {
                *slot = adapter;
            }
        }

        Self { adapters: slots }
    }

    /// Adapter for a kind.
    pub fn get(&self, kind: IntegrationKind) -> Option<&IntegrationAdapter> {
        self.adapters.iter().find(|adapter| adapter.kind == kind)
    }

    /// Every adapter in fallback order.
    pub fn iter(&self) -> impl Iterator<Item = &IntegrationAdapter> {
        self.adapters.iter()
    }

    /// Enabled adapters in fallback order.
    pub fn enabled(&self) -> impl Iterator<Item = &IntegrationAdapter> {
        self.adapters.iter().filter(|adapter| adapter.is_enabled())
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self::from_adapters([])
    }
}

/// Reads the `enabled` flag: a bool, or a truthy string from env overrides.
fn enabled_flag(config: &Value) -> bool {
    match config.get("enabled") {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::String(s)) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
        },
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(
    kind: IntegrationKind,
    config: &Value,
) -> Result<T> {
    serde_json::from_value(config.clone())
        .map_err(|e| DeliveryError::configuration(format!("invalid {kind} configuration: {e}")))
}

/// Resolves an API token from the inline value or the first line of a file.
fn resolve_token(
    kind: IntegrationKind,
    token: Option<&str>,
    token_file: Option<&Path>,
) -> Result<String> {
    if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let Some(path) = token_file else {
        return Err(DeliveryError::configuration(format!("{kind} requires an api token")));
    };

    let contents = std::fs::read_to_string(path).map_err(|e| {
        DeliveryError::configuration(format!(
            "failed to read {kind} token file {}: {e}",
            path.display()
        ))
    })?;

    contents
        .lines()
        .next()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            DeliveryError::configuration(format!("{kind} token file {} is empty", path.display()))
        })
}

/// Accepts chat destinations written as strings or bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Redacts a secret in `Debug` output.
struct Redacted;

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;

    use super::*;

    #[test]
    fn enabled_flag_parsing() {
        assert!(enabled_flag(&json!({"enabled": true})));
        assert!(enabled_flag(&json!({"enabled": "true"})));
        assert!(enabled_flag(&json!({"enabled": "1"})));
        assert!(!enabled_flag(&json!({"enabled": false})));
        assert!(!enabled_flag(&json!({"enabled": "no"})));
        assert!(!enabled_flag(&json!({})));
        assert!(!enabled_flag(&json!("enabled")));
    }

    #[test]
    fn registry_keeps_fallback_order() {
        let mut configs = HashMap::new();
        configs.insert("workplace".to_string(), json!({"enabled": true, "api_token": "t"}));
        configs.insert("status_board".to_string(), json!({"enabled": true}));
        configs.insert("slack".to_string(), json!({"enabled": true, "api_token": "xoxb"}));

        let registry = IntegrationRegistry::from_config(&configs);

        let kinds: Vec<_> = registry.iter().map(IntegrationAdapter::kind).collect();
        assert_eq!(kinds, IntegrationKind::ALL.to_vec());

        let enabled: Vec<_> = registry.enabled().map(IntegrationAdapter::kind).collect();
        assert_eq!(
            enabled,
            [IntegrationKind::Slack, IntegrationKind::StatusBoard, IntegrationKind::Workplace]
        );
    }

    #[test]
    fn missing_and_malformed_config_is_disabled() {
        let mut configs = HashMap::new();
        configs.insert("slack".to_string(), json!({"enabled": true}));
        configs.insert("custom_webhook".to_string(), json!({"enabled": true, "url": 42}));
        configs.insert("status_board".to_string(), json!({"url": "https://board.local/generic"}));

        let registry = IntegrationRegistry::from_config(&configs);

        assert_eq!(registry.enabled().count(), 0);
        assert!(registry.get(IntegrationKind::Workplace).is_some_and(|a| !a.is_enabled()));
    }

    #[test]
    fn disabled_adapter_refuses_to_render() {
        let adapter = IntegrationAdapter::disabled(IntegrationKind::Slack);
        let payload = EventPayload::new("logged_error", herald_core::Attributes::new()).unwrap();

        assert!(matches!(
            adapter.render(&payload),
            Err(DeliveryError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn token_read_from_first_line_of_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  xoxb-secret  ").unwrap();
        writeln!(file, "ignored").unwrap();

        let token = resolve_token(IntegrationKind::Slack, None, Some(file.path())).unwrap();
        assert_eq!(token, "xoxb-secret");

        let inline =
            resolve_token(IntegrationKind::Slack, Some("inline"), Some(file.path())).unwrap();
        assert_eq!(inline, "inline");
    }

    #[test]
    fn missing_token_is_configuration_error() {
        assert!(resolve_token(IntegrationKind::Workplace, None, None).is_err());
        assert!(resolve_token(IntegrationKind::Workplace, Some("  "), None).is_err());

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(resolve_token(IntegrationKind::Workplace, None, Some(empty.path())).is_err());
    }
}
