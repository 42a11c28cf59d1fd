//! Custom webhook integration: the raw event, posted to a fixed URL.

use std::{collections::BTreeMap, time::Duration};

use herald_core::{models::validate_post_url, EventPayload};
use serde::Deserialize;

use super::Rendered;
use crate::{client::OutboundRequest, error::Result, EVENT_HEADER};

/// Custom webhook settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomWebhookConfig {
    /// Receiving endpoint.
    pub url: String,
    /// Static headers added to every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Overrides the client read timeout.
    pub timeout_secs: Option<u64>,
}

/// Forwards every event as its generic wire body.
#[derive(Debug, Clone)]
pub struct CustomWebhookChannel {
    url: String,
    headers: BTreeMap<String, String>,
    timeout: Option<Duration>,
}

impl CustomWebhookChannel {
    /// Builds the channel.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an invalid URL.
    pub fn from_config(config: CustomWebhookConfig) -> Result<Self> {
        validate_post_url(&config.url)?;
        Ok(Self {
            url: config.url,
            headers: config.headers,
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    pub(super) fn render(&self, payload: &EventPayload) -> Rendered {
        let mut request = OutboundRequest::post(&self.url, payload.wire_body())
            .header(EVENT_HEADER, payload.name());
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        Rendered::Send(request)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn posts_wire_body_with_configured_headers() {
        let config: CustomWebhookConfig = serde_json::from_value(json!({
            "url": "https://hooks.example/herald",
            "headers": {"X-Token": "abc"},
            "timeout_secs": 5,
        }))
        .unwrap();
        let channel = CustomWebhookChannel::from_config(config).unwrap();

        let attributes = json!({"target": "web-01"}).as_object().cloned().unwrap_or_default();
        let payload = EventPayload::new("scan.completed", attributes).unwrap();

        let Rendered::Send(request) = channel.render(&payload) else {
            unreachable!("custom webhook sends every event");
        };

        assert_eq!(request.url, "https://hooks.example/herald");
        assert_eq!(request.body, payload.wire_body());
        assert_eq!(request.header_value("x-token"), Some("abc"));
        assert_eq!(request.header_value(EVENT_HEADER), Some("scan.completed"));
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn url_is_required() {
        assert!(serde_json::from_value::<CustomWebhookConfig>(json!({})).is_err());

        let config: CustomWebhookConfig =
            serde_json::from_value(json!({"url": "ftp://x.example"})).unwrap();
        assert!(CustomWebhookChannel::from_config(config).is_err());
    }
}
