//! Session state for multi-turn conversations.
//!
//! A session owns the transcript of one user (or one user and profile) and
//! converts to and from the snapshot record kept in a `KeyValueStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lyla_core::{ChatMessage, Role};

/// Current layout of [`SessionSnapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

/// Store key for a session.
///
/// Named users get `chat/<username>` (or `chat/<username>/<profile>`), anonymous
/// sessions get a fresh `chat/session-<uuid>`.
#[must_use]
pub fn session_key(username: Option<&str>, profile: Option<&str>) -> String {
    let username = username.map(str::trim).filter(|u| !u.is_empty());
    let profile = profile.map(str::trim).filter(|p| !p.is_empty());

    match (username, profile) {
        (Some(user), Some(profile)) => format!("chat/{user}/{profile}"),
        (Some(user), None) => format!("chat/{user}"),
        (None, Some(profile)) => format!("chat/session-{}/{profile}", Uuid::now_v7()),
        (None, None) => format!("chat/session-{}", Uuid::now_v7()),
    }
}

/// A conversation session with its full transcript.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    /// Store key the session persists under
    pub key: String,
    pub username: Option<String>,
    pub profile: Option<String>,
    /// Transcript, oldest first
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            username: None,
            profile: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// Add a message to the transcript.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage::new(role, content));
        self.updated_at = Utc::now();
    }

    /// Get the last N messages from the transcript.
    #[must_use]
    pub fn last_n_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    #[must_use]
    pub fn user_messages(&self) -> Vec<&ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .collect()
    }

    /// Number of completed exchanges.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    #[must_use]
    pub const fn message_count(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Clear all messages from the session.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.updated_at = Utc::now();
    }

    /// Drop every message from `len` onwards.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Snapshot of the first `len` messages, for persisting.
    #[must_use]
    pub fn snapshot(&self, len: usize, model: &str) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            key: self.key.clone(),
            username: self.username.clone(),
            profile: self.profile.clone(),
            model: Some(model.to_string()),
            messages: self.messages[..len.min(self.messages.len())].to_vec(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Replace the transcript with a stored snapshot, keeping this session's
    /// key and identity.
    pub fn restore_from(&mut self, snapshot: SessionSnapshot) {
        self.messages = snapshot.messages;
        self.created_at = snapshot.created_at;
        self.updated_at = snapshot.updated_at;
    }
}

/// Serialized session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_session() {
        let mut session = ConversationSession::new("chat/test");

        assert!(session.is_empty());

        session.add_message(Role::User, "Hello");
        session.add_message(Role::Assistant, "Hi there!");

        assert_eq!(session.message_count(), 2);
        assert_eq!(session.turn_count(), 1);
        assert!(!session.is_empty());

        let last = session.last_n_messages(1);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].content, "Hi there!");

        let user_msgs = session.user_messages();
        assert_eq!(user_msgs.len(), 1);
        assert_eq!(user_msgs[0].content, "Hello");
    }

    #[test]
    fn test_last_n_messages() {
        let mut session = ConversationSession::new("chat/test");

        for i in 0..10 {
            session.add_message(Role::User, format!("Message {i}"));
        }

        assert_eq!(session.last_n_messages(3).len(), 3);
        assert_eq!(session.last_n_messages(3)[0].content, "Message 7");
        assert_eq!(session.last_n_messages(100).len(), 10);
        assert_eq!(session.last_n_messages(0).len(), 0);
    }

    #[test]
    fn session_keys() {
        assert_eq!(session_key(Some("alice"), None), "chat/alice");
        assert_eq!(
            session_key(Some(" alice "), Some("classmate")),
            "chat/alice/classmate"
        );

        let anonymous = session_key(Some("  "), None);
        assert!(anonymous.starts_with("chat/session-"));
        assert_ne!(anonymous, session_key(None, None));
    }

    #[test]
    fn snapshot_excludes_messages_past_len() {
        let mut session =
            ConversationSession::new("chat/alice").with_username(Some("alice".to_string()));
        session.add_message(Role::User, "one");
        session.add_message(Role::Assistant, "two");
        session.add_message(Role::User, "pending");

        let snapshot = session.snapshot(2, "gemma2-9b-it");
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.username.as_deref(), Some("alice"));
        assert_eq!(snapshot.model.as_deref(), Some("gemma2-9b-it"));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn snapshot_without_version_defaults() {
        let json = r#"{"key":"chat/bob","messages":[{"role":"user","content":"hey"}],
            "created_at":"2024-09-01T10:00:00Z","updated_at":"2024-09-01T10:05:00Z"}"#;
        let snapshot: SessionSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.messages[0].timestamp, None);
    }
}
