//! Status board (pwnboard) host callbacks.
//!
//! On every `session_checkin` the board learns which IP addresses are still
//! alive, so it can colour those hosts as owned.

use std::time::Duration;

use herald_core::{models::validate_post_url, EventPayload};
use serde::Deserialize;
use serde_json::{json, Value};

use super::Rendered;
use crate::{client::OutboundRequest, error::Result};

const SESSION_CHECKIN: &str = "session_checkin";
const DEFAULT_URL: &str = "https://pwnboard.local/generic";
const DEFAULT_AGENT: &str = "Arsenal";

/// Status board settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBoardConfig {
    /// Board endpoint.
    #[serde(default = "default_url")]
    pub url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    3
}

/// Reports checked-in hosts to a status board.
#[derive(Debug, Clone)]
pub struct StatusBoardChannel {
    url: String,
    timeout: Duration,
}

impl StatusBoardChannel {
    /// Builds the channel.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` for an invalid board URL.
    pub fn from_config(config: StatusBoardConfig) -> Result<Self> {
        validate_post_url(&config.url)?;
        Ok(Self { url: config.url, timeout: Duration::from_secs(config.timeout_secs) })
    }

    pub(super) fn render(&self, payload: &EventPayload) -> Rendered {
        if payload.name() != SESSION_CHECKIN {
            return Rendered::Skip(format!("status board does not handle {}", payload.name()));
        }

        let ips = interface_addresses(payload);
        if ips.is_empty() {
            return Rendered::Skip("session check-in carries no ip addresses".to_string());
        }

        let agent = payload
            .attribute("session")
            .and_then(|session| session.get("agent_version"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_AGENT);

        let body = json!({"ips": ips, "type": agent});
        Rendered::Send(OutboundRequest::post(&self.url, body).timeout(self.timeout))
    }
}

/// Every `target.facts.interfaces[*].ip_addrs[*]`, in order.
fn interface_addresses(payload: &EventPayload) -> Vec<Value> {
    payload
        .attribute("target")
        .and_then(|target| target.pointer("/facts/interfaces"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|iface| iface.get("ip_addrs").and_then(Value::as_array))
        .flatten()
        .cloned()
        .collect()
}
