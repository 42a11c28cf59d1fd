//! Chat message rendering shared by the Slack and Workplace integrations.

use herald_core::{time::from_epoch_seconds, EventPayload};
use serde_json::Value;

use crate::error::{DeliveryError, Result};

/// Event carrying an application log entry under `log`.
pub const LOGGED_ERROR: &str = "logged_error";

/// Event carrying a finished action under `action`.
pub const ACTION_COMPLETE: &str = "action_complete";

/// Events chat integrations post messages for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEvent {
    /// `logged_error`
    LoggedError,
    /// `action_complete`
    ActionComplete,
}

impl ChatEvent {
    /// Classifies an event name, `None` for events chat integrations skip.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            LOGGED_ERROR => Some(Self::LoggedError),
            ACTION_COMPLETE => Some(Self::ActionComplete),
            _ => None,
        }
    }

    /// Renders the message text for this event.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPayload` when the attribute the message is built from
    /// is missing or not an object.
    pub fn render(self, payload: &EventPayload) -> Result<String> {
        match self {
            Self::LoggedError => logged_error_text(payload),
            Self::ActionComplete => action_complete_text(payload),
        }
    }
}

/// `ERROR: [level][YYYY-mm-dd HH:MM:SS]\t[application] message`
///
/// The timestamp comes from `log.timestamp` in epoch seconds and falls back
/// to the event's occurrence time.
pub fn logged_error_text(payload: &EventPayload) -> Result<String> {
    let entry = object_attribute(payload, "log")?;

    let timestamp = entry
        .get("timestamp")
        .and_then(Value::as_f64)
        .and_then(from_epoch_seconds)
        .unwrap_or_else(|| payload.occurred_at());

    Ok(format!(
        "ERROR: [{}][{}]\t[{}] {}",
        field(entry, "level"),
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        field(entry, "application"),
        field(entry, "message"),
    ))
}

/// ``Action Completed (id: `action_id`) [status] target_name `action_string` ``
pub fn action_complete_text(payload: &EventPayload) -> Result<String> {
    let action = object_attribute(payload, "action")?;

    Ok(format!(
        "Action Completed (id: `{}`) [{}] {} `{}`",
        field(action, "action_id"),
        field(action, "status"),
        field(action, "target_name"),
        field(action, "action_string"),
    ))
}

fn object_attribute<'a>(
    payload: &'a EventPayload,
    key: &str,
) -> Result<&'a serde_json::Map<String, Value>> {
    payload.attribute(key).and_then(Value::as_object).ok_or_else(|| {
        DeliveryError::invalid_payload(format!("{} event has no `{key}` object", payload.name()))
    })
}

/// Strings render bare, missing values as `None`, anything else as JSON.
fn field(object: &serde_json::Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        None | Some(Value::Null) => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(name: &str, attributes: Value) -> EventPayload {
        EventPayload::new(name, attributes.as_object().cloned().unwrap_or_default()).unwrap()
    }

    #[test]
    fn logged_error_format() {
        let event = payload(
            LOGGED_ERROR,
            json!({"log": {
                "level": "CRIT",
                "timestamp": 1_714_564_800,
                "application": "teamserver",
                "message": "database unreachable",
            }}),
        );

        assert_eq!(
            logged_error_text(&event).unwrap(),
            "ERROR: [CRIT][2024-05-01 12:00:00]\t[teamserver] database unreachable"
        );
    }

    #[test]
    fn logged_error_without_timestamp_uses_occurrence_time() {
        let event = payload(LOGGED_ERROR, json!({"log": {"level": "WARN", "message": "x"}}));
        let expected = event.occurred_at().format("%Y-%m-%d %H:%M:%S").to_string();

        let text = logged_error_text(&event).unwrap();
        assert!(text.contains(&expected), "{text}");
        assert!(text.contains("[None] x"), "{text}");
    }

    #[test]
    fn action_complete_format() {
        let event = payload(
            ACTION_COMPLETE,
            json!({"action": {
                "action_id": "a1b2",
                "status": "complete",
                "target_name": "web-01",
                "action_string": "exec whoami",
            }}),
        );

        assert_eq!(
            action_complete_text(&event).unwrap(),
            "Action Completed (id: `a1b2`) [complete] web-01 `exec whoami`"
        );
    }

    #[test]
    fn missing_attribute_is_invalid_payload() {
        let event = payload(ACTION_COMPLETE, json!({"action": "not an object"}));
        assert!(matches!(
            action_complete_text(&event),
            Err(DeliveryError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn chat_event_classification() {
        assert_eq!(ChatEvent::from_name("logged_error"), Some(ChatEvent::LoggedError));
        assert_eq!(ChatEvent::from_name("action_complete"), Some(ChatEvent::ActionComplete));
        assert_eq!(ChatEvent::from_name("session_checkin"), None);
    }
}
