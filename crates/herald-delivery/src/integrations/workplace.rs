//! Workplace chat thread messages via the Graph API.

use std::{fmt, path::PathBuf, time::Duration};

use herald_core::{models::validate_post_url, EventPayload, IntegrationKind};
use serde::Deserialize;
use serde_json::json;

use super::{messages::ChatEvent, resolve_token, string_or_number, Redacted, Rendered};
use crate::{
    client::OutboundRequest,
    error::{DeliveryError, Result},
};

const DEFAULT_URL: &str = "https://graph.facebook.com/v3.2/me/messages";

/// Workplace integration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkplaceConfig {
    /// Page access token.
    pub api_token: Option<String>,
    /// File whose first line holds the access token.
    pub api_token_file: Option<PathBuf>,
    /// Messages endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Thread for `logged_error` messages.
    #[serde(default, deserialize_with = "string_or_number")]
    pub error_thread: Option<String>,
    /// Thread for `action_complete` messages.
    #[serde(default, deserialize_with = "string_or_number")]
    pub action_thread: Option<String>,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Posts `logged_error` and `action_complete` messages to chat threads.
#[derive(Clone)]
pub struct WorkplaceChannel {
    endpoint: String,
    timeout: Duration,
    error_thread: Option<String>,
    action_thread: Option<String>,
}

impl WorkplaceChannel {
    /// Builds the channel, resolving the token into the endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an invalid URL or a missing token.
    pub fn from_config(config: WorkplaceConfig) -> Result<Self> {
        let mut endpoint = validate_post_url(&config.url)?;
        let api_token = resolve_token(
            IntegrationKind::Workplace,
            config.api_token.as_deref(),
            config.api_token_file.as_deref(),
        )?;
        endpoint.query_pairs_mut().append_pair("access_token", &api_token);

        Ok(Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(config.timeout_secs),
            error_thread: config.error_thread,
            action_thread: config.action_thread,
        })
    }

    pub(super) fn render(&self, payload: &EventPayload) -> Result<Rendered> {
        let Some(event) = ChatEvent::from_name(payload.name()) else {
            return Ok(Rendered::Skip(format!("workplace does not handle {}", payload.name())));
        };

        let thread = match event {
            ChatEvent::LoggedError => self.error_thread.as_deref(),
            ChatEvent::ActionComplete => self.action_thread.as_deref(),
        }
        .ok_or_else(|| {
            DeliveryError::configuration(format!(
                "workplace has no thread configured for {}",
                payload.name()
            ))
        })?;
        let text = event.render(payload)?;

        Ok(Rendered::Send(
            OutboundRequest::post(
                &self.endpoint,
                json!({"recipient": {"thread_key": thread}, "message": {"text": text}}),
            )
            .timeout(self.timeout),
        ))
    }
}

impl fmt::Debug for WorkplaceChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkplaceChannel")
            .field("endpoint", &Redacted)
            .field("timeout", &self.timeout)
            .field("error_thread", &self.error_thread)
            .field("action_thread", &self.action_thread)
            .finish()
    }
}
