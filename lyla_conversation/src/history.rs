//! Conversation history management.
//!
//! The memory window is the suffix of the transcript forwarded to the backend
//! as context. It is derived from the transcript on every turn and never
//! stored on its own.

use lyla_core::{ChatMessage, Role};

/// Configuration for the memory window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum number of transcript messages in the window (K)
    pub max_messages: usize,
    /// Optional character budget, trimmed from the oldest end
    pub max_chars: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: 100,
            max_chars: None,
        }
    }
}

impl HistoryConfig {
    #[must_use]
    pub const fn with_max_messages(mut self, max: usize) -> Self {
        self.max_messages = max;
        self
    }

    #[must_use]
    pub const fn with_max_chars(mut self, max: Option<usize>) -> Self {
        self.max_chars = max;
        self
    }
}

/// A sliding window over conversation history.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    config: HistoryConfig,
}

impl HistoryWindow {
    #[must_use]
    pub const fn with_config(config: HistoryConfig) -> Self {
        Self { config }
    }

    /// Select the most recent messages that fit the window.
    #[must_use]
    pub fn select_messages(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let start = messages.len().saturating_sub(self.config.max_messages);
        let mut selected = &messages[start..];

        if let Some(max_chars) = self.config.max_chars {
            let mut total: usize = selected.iter().map(|m| m.content.len()).sum();
            while total > max_chars {
                let Some((first, rest)) = selected.split_first() else {
                    break;
                };
                total -= first.content.len();
                selected = rest;
            }
        }

        selected.to_vec()
    }

    #[must_use]
    pub const fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: HistoryConfig) {
        self.config = config;
    }
}

/// Builds backend requests from a transcript.
#[derive(Debug, Clone, Default)]
pub struct HistoryManager {
    window: HistoryWindow,
}

impl HistoryManager {
    #[must_use]
    pub const fn new(config: HistoryConfig) -> Self {
        Self {
            window: HistoryWindow::with_config(config),
        }
    }

    #[must_use]
    pub const fn window(&self) -> &HistoryWindow {
        &self.window
    }

    /// System prompt, optional extra system context, the memory window over
    /// `history`, then the new user message.
    #[must_use]
    pub fn build_llm_messages(
        &self,
        system_prompt: &str,
        extra_context: Option<&str>,
        history: &[ChatMessage],
        new_message: &ChatMessage,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::untimed(Role::System, system_prompt)];

        if let Some(context) = extra_context {
            messages.push(ChatMessage::untimed(Role::System, context));
        }

        messages.extend(self.window.select_messages(history));
        messages.push(new_message.clone());

        messages
    }

    #[must_use]
    pub fn stats(history: &[ChatMessage]) -> HistoryStats {
        let total_chars: usize = history.iter().map(|m| m.content.len()).sum();
        let user_count = history.iter().filter(|m| m.role == Role::User).count();
        let assistant_count = history.iter().filter(|m| m.role == Role::Assistant).count();

        HistoryStats {
            total_messages: history.len(),
            user_messages: user_count,
            assistant_messages: assistant_count,
            total_characters: total_chars,
            estimated_tokens: total_chars / 4, // Rough estimate: 4 chars per token
        }
    }
}

/// Statistics about conversation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub total_characters: usize,
    pub estimated_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_messages(count: usize) -> Vec<ChatMessage> {
        (0..count)
            .map(|i| {
                let role = if i % 2 == 0 {
                    Role::User
                } else {
                    Role::Assistant
                };
                ChatMessage::new(role, format!("Message {i}: {}", "x".repeat(100)))
            })
            .collect()
    }

    #[test]
    fn test_history_window_select() {
        let window = HistoryWindow::with_config(HistoryConfig::default().with_max_messages(5));
        let messages = create_test_messages(20);

        let selected = window.select_messages(&messages);

        assert_eq!(selected.len(), 5);
        assert!(selected[0].content.starts_with("Message 15:"));
        assert!(selected[4].content.starts_with("Message 19:"));
    }

    #[test]
    fn window_never_exceeds_limit() {
        let window = HistoryWindow::with_config(HistoryConfig::default().with_max_messages(3));
        for len in 0..10 {
            let messages = create_test_messages(len);
            assert_eq!(window.select_messages(&messages).len(), len.min(3));
        }
    }

    #[test]
    fn test_history_char_limit() {
        let config = HistoryConfig::default()
            .with_max_messages(100)
            .with_max_chars(Some(500));
        let window = HistoryWindow::with_config(config);
        let messages = create_test_messages(20);

        let selected = window.select_messages(&messages);

        let total_chars: usize = selected.iter().map(|m| m.content.len()).sum();
        assert!(total_chars <= 500);
        assert_eq!(selected.last(), messages.last());
    }

    #[test]
    fn test_history_manager_build() {
        let manager = HistoryManager::new(HistoryConfig::default().with_max_messages(3));
        let history = create_test_messages(10);
        let new_message = ChatMessage::new(Role::User, "New message");

        let messages =
            manager.build_llm_messages("You are helpful.", Some("{}"), &history, &new_message);

        // System + profile data + last 3 history + new message
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::System);
        assert_eq!(messages[2].content, history[7].content);
        let last_msg = &messages[messages.len() - 1];
        assert_eq!(last_msg.content, "New message");
    }

    #[test]
    fn test_history_stats() {
        let messages = create_test_messages(10);

        let stats = HistoryManager::stats(&messages);

        assert_eq!(stats.total_messages, 10);
        assert_eq!(stats.user_messages, 5);
        assert_eq!(stats.assistant_messages, 5);
        assert!(stats.estimated_tokens > 0);
    }
}
