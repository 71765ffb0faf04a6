//! Session identity and lifecycle state.

use std::fmt;

use uuid::Uuid;

/// Identity of one client connection.
///
/// Registry membership is keyed by this id, never by display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a session.
///
/// `Connected` → `Named` → `Active` → `Disconnected`; nothing returns to
/// `Connected` and `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no display name yet
    Connected,
    /// First valid username received
    Named,
    /// Exchanging messages (or renamed again)
    Active,
    /// Read loop exited, unregistered and closed
    Disconnected,
}

impl SessionState {
    /// State after the session took a new display name
    pub fn on_renamed(self) -> Self {
        match self {
            Self::Connected => Self::Named,
            Self::Named | Self::Active => Self::Active,
            Self::Disconnected => Self::Disconnected,
        }
    }

    /// State after the session published a chat line
    pub fn on_message(self) -> Self {
        match self {
            Self::Named => Self::Active,
            other => other,
        }
    }
}
