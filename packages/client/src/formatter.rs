//! Message formatting utilities for client display.

use parlor_server::domain::{ChatMessage, MessageKind};
use parlor_shared::time::rfc3339_to_local_clock_time;

/// Shown in place of the clock when a timestamp cannot be parsed
const UNKNOWN_TIME: &str = "--:--:--";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format any event received from the server
    pub fn format(message: &ChatMessage) -> String {
        match message.kind {
            MessageKind::Announce => Self::format_announce(&message.text),
            MessageKind::Message => {
                Self::format_chat_message(&message.username, &message.text, &message.timestamp)
            }
        }
    }

    /// Format a join notice
    ///
    /// # Arguments
    ///
    /// * `text` - Notice text as sent by the server
    pub fn format_announce(text: &str) -> String {
        format!("\n*** {}\n", text)
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `from` - Display name of the sender
    /// * `text` - The message text
    /// * `timestamp` - RFC 3339 timestamp stamped by the server
    ///
    /// # Returns
    ///
    /// The message prefixed with the local wall-clock time it was sent at
    pub fn format_chat_message(from: &str, text: &str, timestamp: &str) -> String {
        let clock = rfc3339_to_local_clock_time(timestamp);
        format!(
            "\n[{}] {}: {}\n",
            clock.as_deref().unwrap_or(UNKNOWN_TIME),
            from,
            text
        )
    }

    /// Format a binary message notification
    pub fn format_binary_message(byte_count: usize) -> String {
        format!("\n← Received {} bytes of binary data\n", byte_count)
    }

    /// Format a raw text message (when parsing fails)
    pub fn format_raw_message(text: &str) -> String {
        format!("\n← Received: {}\n", text)
    }
}
