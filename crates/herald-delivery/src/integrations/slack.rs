//! Slack channel messages via `chat.postMessage`.

use std::{fmt, path::PathBuf, time::Duration};

use herald_core::{models::validate_post_url, EventPayload, IntegrationKind};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{messages::ChatEvent, resolve_token, Redacted, Rendered};
use crate::{
    client::{extract_retry_after_seconds, OutboundRequest, TransportResponse},
    error::{DeliveryError, Result},
};

const DEFAULT_API_URL: &str = "https://slack.com/api/chat.postMessage";
const DEFAULT_CHANNEL: &str = "notifications";

/// Slack integration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    /// Bot token.
    pub api_token: Option<String>,
    /// File whose first line holds the bot token.
    pub api_token_file: Option<PathBuf>,
    /// `chat.postMessage` endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Channel for `logged_error` messages.
    #[serde(default = "default_channel")]
    pub error_channel: String,
    /// Channel for `action_complete` messages.
    #[serde(default = "default_channel")]
    pub action_channel: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

/// Posts `logged_error` and `action_complete` messages to Slack channels.
#[derive(Clone)]
pub struct SlackChannel {
    api_url: String,
    api_token: String,
    timeout: Duration,
    error_channel: String,
    action_channel: String,
}

impl SlackChannel {
    /// Builds the channel, resolving the token.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an invalid API URL or a missing token.
    pub fn from_config(config: SlackConfig) -> Result<Self> {
        validate_post_url(&config.api_url)?;
        let api_token = resolve_token(
            IntegrationKind::Slack,
            config.api_token.as_deref(),
            config.api_token_file.as_deref(),
        )?;

        Ok(Self {
            api_url: config.api_url,
            api_token,
            timeout: Duration::from_secs(config.timeout_secs),
            error_channel: config.error_channel,
            action_channel: config.action_channel,
        })
    }

    pub(super) fn render(&self, payload: &EventPayload) -> Result<Rendered> {
        let Some(event) = ChatEvent::from_name(payload.name()) else {
            return Ok(Rendered::Skip(format!("slack does not handle {}", payload.name())));
        };

        let channel = match event {
            ChatEvent::LoggedError => &self.error_channel,
            ChatEvent::ActionComplete => &self.action_channel,
        };
        let text = event.render(payload)?;

        Ok(Rendered::Send(
            OutboundRequest::post(&self.api_url, json!({"channel": channel, "text": text}))
                .header("Authorization", format!("Bearer {}", self.api_token))
                .timeout(self.timeout),
        ))
    }

    /// Slack answers 200 with `{"ok": false, "error": ...}` on refusal.
    pub(super) fn check_response(&self, response: &TransportResponse) -> Result<()> {
        let Ok(body) = serde_json::from_str::<Value>(&response.body) else {
            return Ok(());
        };
        if body.get("ok").and_then(Value::as_bool) != Some(false) {
            return Ok(());
        }

        let reason = body.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
        if reason == "ratelimited" {
            return Err(DeliveryError::rate_limited(extract_retry_after_seconds(
                &response.headers,
            )));
        }

        Err(DeliveryError::rejected(IntegrationKind::Slack.as_str(), reason))
    }
}

impl fmt::Debug for SlackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackChannel")
            .field("api_url", &self.api_url)
            .field("api_token", &Redacted)
            .field("timeout", &self.timeout)
            .field("error_channel", &self.error_channel)
            .field("action_channel", &self.action_channel)
            .finish()
    }
}
