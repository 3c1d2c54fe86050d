//! Action events
//!
//! One immutable entry in a memory record. Insertion order is significant:
//! it drives both the audit trail and the prompt-context projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Action name of chat messages
pub const MESSAGE_ACTION: &str = "Message";
/// Prefix of successful tool-call events
pub const COMPLETED_TOOL_PREFIX: &str = "CompletedTool_";
/// Prefix of failed tool-call events
pub const ERROR_TOOL_PREFIX: &str = "ErrorTool_";

/// One entry in a memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Action name (`Message`, `Started_VisionAnalysis`, ...)
    pub action: String,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Opaque structured payload
    #[serde(default)]
    pub data: Value,
}

impl ActionEvent {
    /// Create event stamped with the current time
    #[inline]
    #[must_use]
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self::at(action, Utc::now(), data)
    }

    /// Create event with an explicit timestamp
    #[inline]
    #[must_use]
    pub fn at(action: impl Into<String>, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            action: action.into(),
            timestamp,
            data,
        }
    }

    /// Create chat message event
    #[must_use]
    pub fn message(text: impl Into<String>, role: MessageRole) -> Self {
        let payload = MessagePayload {
            text: text.into(),
            is_user: role == MessageRole::User,
            is_system: role == MessageRole::System,
        };
        Self::new(
            MESSAGE_ACTION,
            serde_json::to_value(payload).unwrap_or(Value::Null),
        )
    }

    /// Create successful tool-call event
    #[must_use]
    pub fn tool_completed(tool: &str, result: Value) -> Self {
        Self::new(
            format!("{COMPLETED_TOOL_PREFIX}{tool}"),
            serde_json::json!({ "result": result }),
        )
    }

    /// Create failed tool-call event
    #[must_use]
    pub fn tool_errored(tool: &str, error: impl Into<String>) -> Self {
        Self::new(
            format!("{ERROR_TOOL_PREFIX}{tool}"),
            serde_json::json!({ "error": error.into() }),
        )
    }

    /// Classify the event by its action name
    #[must_use]
    pub fn kind(&self) -> EventKind<'_> {
        if self.action == MESSAGE_ACTION {
            EventKind::Message
        } else if let Some(tool) = self.action.strip_prefix(COMPLETED_TOOL_PREFIX) {
            EventKind::CompletedTool(tool)
        } else if let Some(tool) = self.action.strip_prefix(ERROR_TOOL_PREFIX) {
            EventKind::ErrorTool(tool)
        } else {
            EventKind::Other
        }
    }

    /// Check if this is a chat message
    #[inline]
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.action == MESSAGE_ACTION
    }
}

/// Event classification used by projections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind<'a> {
    /// Chat message
    Message,
    /// Tool call that returned a result
    CompletedTool(&'a str),
    /// Tool call that failed
    ErrorTool(&'a str),
    /// Anything else (stage lifecycle, run lifecycle, ...)
    Other,
}

/// Who sent a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    /// End user
    User,
    /// Assistant / agent
    Assistant,
    /// System notice
    System,
}

impl MessageRole {
    /// Label used when rendering the message
    #[inline]
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            MessageRole::System => "System",
        }
    }
}

/// Payload of a `Message` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message text
    #[serde(default, alias = "content", alias = "message")]
    pub text: String,
    /// Sent by the end user
    #[serde(default)]
    pub is_user: bool,
    /// System notice
    #[serde(default)]
    pub is_system: bool,
}

impl MessagePayload {
    /// Decode from an event payload, tolerating missing fields
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => Self {
                text: text.clone(),
                ..Self::default()
            },
            other => serde_json::from_value(other.clone()).unwrap_or_default(),
        }
    }

    /// Role derived from the boolean flags; `isUser` wins over `isSystem`
    #[inline]
    #[must_use]
    pub fn role(&self) -> MessageRole {
        if self.is_user {
            MessageRole::User
        } else if self.is_system {
            MessageRole::System
        } else {
            MessageRole::Assistant
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kinds() {
        assert_eq!(
            ActionEvent::message("hi", MessageRole::User).kind(),
            EventKind::Message
        );
        assert_eq!(
            ActionEvent::tool_completed("Vision", json!({})).kind(),
            EventKind::CompletedTool("Vision")
        );
        assert_eq!(
            ActionEvent::tool_errored("Scrape", "boom").kind(),
            EventKind::ErrorTool("Scrape")
        );
        assert_eq!(
            ActionEvent::new("Started_VisionAnalysis", json!({})).kind(),
            EventKind::Other
        );
    }

    #[test]
    fn message_payload_flags() {
        let user = ActionEvent::message("hello", MessageRole::User);
        assert_eq!(user.data["isUser"], json!(true));
        assert_eq!(MessagePayload::from_value(&user.data).role(), MessageRole::User);

        let system = MessagePayload::from_value(&json!({"content": "note", "isSystem": true}));
        assert_eq!(system.text, "note");
        assert_eq!(system.role(), MessageRole::System);

        let bare = MessagePayload::from_value(&json!("plain"));
        assert_eq!(bare.role(), MessageRole::Assistant);
        assert_eq!(bare.text, "plain");
    }

    #[test]
    fn event_serde_roundtrip_keeps_payload() {
        let event = ActionEvent::new("Completed_MarketAnalysis", json!({"elapsedMs": 12}));
        let text = serde_json::to_string(&event).unwrap();
        let back: ActionEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
