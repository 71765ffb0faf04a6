//! Chat message model and wire schema.
//!
//! Field names on the wire are fixed (`MessageType`, `Username`, `Timestamp`,
//! `Text`) so existing frontends keep working.

use serde::{Deserialize, Deserializer, Serialize};

/// Kind of a chat event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// User-authored chat line
    Message,
    /// System notice emitted when a session's display name is set or changed
    Announce,
}

/// One event disseminated by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "MessageType")]
    pub kind: MessageKind,
    #[serde(rename = "Username")]
    pub username: String,
    /// RFC 3339 UTC timestamp; always overwritten at dispatch time
    #[serde(rename = "Timestamp", default)]
    pub timestamp: String,
    #[serde(rename = "Text", default)]
    pub text: String,
}

impl ChatMessage {
    /// Create a `message` kind event. The timestamp is left empty for the
    /// coordinator to stamp.
    pub fn message(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Message,
            username: username.into(),
            timestamp: String::new(),
            text: text.into(),
        }
    }

    /// Create the `announce` event for a session that took `username`.
    pub fn announce(username: impl Into<String>) -> Self {
        let username = username.into();
        let text = format!("{} has joined the chat room", username);
        Self {
            kind: MessageKind::Announce,
            username,
            timestamp: String::new(),
            text,
        }
    }

    /// Return a copy of this message carrying `timestamp`.
    pub fn stamped(&self, timestamp: String) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }
}

/// Message as received from a client.
///
/// Every field is optional; `MessageType` and `Timestamp` are accepted but
/// ignored since the server decides both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    #[serde(rename = "Username", deserialize_with = "null_as_empty")]
    pub username: String,
    #[serde(rename = "Text", deserialize_with = "null_as_empty")]
    pub text: String,
}

/// Read an explicit `null` the same as a missing string
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
