//! Conversation manager for multi-turn dialogue.
//!
//! The `ConversationManager` owns one session, forwards a bounded memory
//! window to the chat backend on each turn, and persists the transcript
//! through a `KeyValueStore`.

use crate::history::{HistoryConfig, HistoryManager};
use crate::session::{ConversationSession, SessionSnapshot, session_key};
use chrono::Utc;
use lyla_core::{
    ChatMessage, ChatRequest, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, KeyValueStore, LLMProvider,
    Role,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A persona with custom facts, sent to the backend as system context.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Replaces the default system prompt
    pub context: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    /// The profile's custom data as a system message body, if it has any.
    #[must_use]
    pub fn data_context(&self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let mut data = self.data.clone();
        data.insert("name".to_string(), self.name.clone().into());
        Some(serde_json::Value::Object(data).to_string())
    }
}

/// Configuration for conversation management.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Store key (persists across runs)
    pub session_key: String,
    pub username: Option<String>,
    pub profile: Option<Profile>,
    /// Model to use for completions
    pub model: String,
    pub system_prompt: String,
    /// Maximum messages forwarded as context (K)
    pub history_limit: usize,
    pub max_history_chars: Option<usize>,
    /// Temperature for sampling
    pub temperature: f32,
    /// Max tokens in response
    pub max_tokens: usize,
    pub top_p: Option<f32>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            session_key: session_key(None, None),
            username: None,
            profile: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: 100,
            max_history_chars: None,
            temperature: 0.7,
            max_tokens: 1024,
            top_p: None,
        }
    }
}

impl ConversationConfig {
    /// Set the user, deriving the store key from user and profile.
    #[must_use]
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username.filter(|u| !u.trim().is_empty());
        self.session_key = self.derived_key();
        self
    }

    /// Set the profile, deriving the store key from user and profile.
    #[must_use]
    pub fn with_profile(mut self, profile: Option<Profile>) -> Self {
        self.profile = profile;
        self.session_key = self.derived_key();
        self
    }

    #[must_use]
    pub fn with_session_key(mut self, key: String) -> Self {
        self.session_key = key;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    #[must_use]
    pub const fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_top_p(mut self, top_p: Option<f32>) -> Self {
        self.top_p = top_p;
        self
    }

    #[must_use]
    pub const fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn derived_key(&self) -> String {
        session_key(
            self.username.as_deref(),
            self.profile.as_ref().map(|p| p.id.as_str()),
        )
    }

    /// The system instruction for each turn: the profile's context when a
    /// profile with a context is selected.
    #[must_use]
    pub fn effective_system_prompt(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.context.as_str())
            .filter(|context| !context.trim().is_empty())
            .unwrap_or(self.system_prompt.as_str())
    }
}

/// Errors that can occur during conversation management.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Still waiting for a reply to the previous message")]
    Busy,

    #[error("No user message is waiting for a reply")]
    NoPendingMessage,

    #[error("Chat backend error: {0:#}")]
    Backend(anyhow::Error),

    #[error("Empty response from chat backend")]
    EmptyResponse,

    #[error("Session storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Corrupt session record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Saving is off for this session because its stored record could not be loaded")]
    Detached,
}

/// Whether a backend call is outstanding for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingReply,
}

/// Token usage information for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

/// Assistant reply appended by a successful `request_reply`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub usage: Option<TurnUsage>,
    pub turn_number: usize,
}

/// Result of processing a conversation turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Assistant's response
    pub response: String,
    pub usage: Option<TurnUsage>,
    pub turn_number: usize,
    /// Set when the turn succeeded but could not be saved
    pub persist_error: Option<String>,
}

/// Multi-turn conversation manager for one session.
pub struct ConversationManager<P = Arc<dyn LLMProvider>, S = Arc<dyn KeyValueStore>>
where
    P: Send + Sync,
    S: Send + Sync,
{
    provider: P,
    storage: S,
    config: ConversationConfig,
    history: HistoryManager,
    session: ConversationSession,
    state: SessionState,
    /// Transcript length before the unanswered user message, if any
    pending: Option<usize>,
    /// Set when the stored record could not be read; writes would clobber it
    detached: bool,
}

impl<P, S> ConversationManager<P, S>
where
    P: LLMProvider + Send + Sync,
    S: KeyValueStore + Send + Sync,
{
    /// Create a manager with an empty transcript.
    pub fn new(provider: P, storage: S, config: ConversationConfig) -> Self {
        info!(
            "Creating conversation manager for session: {}",
            config.session_key
        );

        let session = ConversationSession::new(config.session_key.clone())
            .with_username(config.username.clone())
            .with_profile(config.profile.as_ref().map(|p| p.id.clone()));
        let history = HistoryManager::new(
            HistoryConfig::default()
                .with_max_messages(config.history_limit)
                .with_max_chars(config.max_history_chars),
        );

        Self {
            provider,
            storage,
            config,
            history,
            session,
            state: SessionState::Idle,
            pending: None,
            detached: false,
        }
    }

    /// Create a manager and restore its transcript from storage.
    pub async fn open(
        provider: P,
        storage: S,
        config: ConversationConfig,
    ) -> Result<Self, ConversationError> {
        let mut manager = Self::new(provider, storage, config);
        manager.restore().await?;
        Ok(manager)
    }

    /// Create a manager, restoring its transcript when the store allows.
    ///
    /// A store that cannot be read or a record that cannot be parsed does
    /// not prevent the conversation: it starts empty and the load error is
    /// returned alongside the manager. An unparsable record is copied to a
    /// `<key>.corrupt-<timestamp>` key first and then replaced by the next
    /// save. When the store is unreachable, or the copy fails, the manager
    /// stops saving so the stored record is left untouched.
    pub async fn open_or_recover(
        provider: P,
        storage: S,
        config: ConversationConfig,
    ) -> (Self, Option<ConversationError>) {
        let mut manager = Self::new(provider, storage, config);
        let warning = manager.recover().await;
        (manager, warning)
    }

    async fn recover(&mut self) -> Option<ConversationError> {
        let key = self.config.session_key.clone();

        let stored = match self.storage.get(&key).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not load session {key}, continuing without saving: {e:#}");
                self.start_empty();
                self.detached = true;
                return Some(ConversationError::Storage(e));
            }
        };

        let Some(json) = stored else {
            self.start_empty();
            return None;
        };

        match serde_json::from_str::<SessionSnapshot>(&json) {
            Ok(snapshot) => {
                self.apply_snapshot(snapshot);
                None
            }
            Err(e) => {
                warn!("Unreadable session record at {key}: {e}");
                self.start_empty();

                let backup = format!("{key}.corrupt-{}", Utc::now().format("%Y%m%d%H%M%S"));
                match self.storage.put(&backup, &json).await {
                    Ok(()) => info!("Kept unreadable record for {key} at {backup}"),
                    Err(put_err) => {
                        warn!("Could not keep a copy of {key}, continuing without saving: {put_err:#}");
                        self.detached = true;
                    }
                }
                Some(ConversationError::Serialization(e))
            }
        }
    }

    /// Whether turns are being saved to the store.
    #[must_use]
    pub const fn is_saving(&self) -> bool {
        !self.detached
    }

    #[must_use]
    pub const fn session(&self) -> &ConversationSession {
        &self.session
    }

    #[must_use]
    pub const fn config(&self) -> &ConversationConfig {
        &self.config
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Switch the backend model for subsequent turns.
    pub fn set_model(&mut self, model: String) {
        info!("Switching model to {model}");
        self.config.model = model;
    }

    /// Completed part of the transcript, excluding an unanswered user message.
    fn settled_len(&self) -> usize {
        self.pending.unwrap_or(self.session.message_count())
    }

    /// The memory window the next turn would forward to the backend.
    #[must_use]
    pub fn memory_window(&self) -> Vec<ChatMessage> {
        self.history
            .window()
            .select_messages(&self.session.messages[..self.settled_len()])
    }

    /// Append a user message, opening a turn.
    pub fn append_user_message(&mut self, text: &str) -> Result<(), ConversationError> {
        if self.pending.is_some() || self.state == SessionState::AwaitingReply {
            return Err(ConversationError::Busy);
        }
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        self.pending = Some(self.session.message_count());
        self.session.add_message(Role::User, text);
        Ok(())
    }

    /// Backend request for the pending user message.
    pub fn build_request(&self) -> Result<ChatRequest, ConversationError> {
        let pending_at = self.pending.ok_or(ConversationError::NoPendingMessage)?;
        let user_message = &self.session.messages[pending_at];
        let profile_data = self.config.profile.as_ref().and_then(Profile::data_context);

        let messages = self.history.build_llm_messages(
            self.config.effective_system_prompt(),
            profile_data.as_deref(),
            &self.session.messages[..pending_at],
            user_message,
        );

        Ok(ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
        })
    }

    /// Ask the backend to answer the pending user message.
    ///
    /// On failure the pending user message is removed again, leaving the
    /// transcript as it was before the turn.
    pub async fn request_reply(&mut self) -> Result<Reply, ConversationError> {
        let request = self.build_request()?;
        let pending_at = self.pending.ok_or(ConversationError::NoPendingMessage)?;

        debug!(
            "Requesting reply with {} context messages",
            request.messages.len()
        );

        self.state = SessionState::AwaitingReply;
        let result = self.provider.chat(&request).await;
        self.state = SessionState::Idle;

        let response = match result {
            Ok(response) if response.content.trim().is_empty() => {
                self.rollback(pending_at);
                return Err(ConversationError::EmptyResponse);
            }
            Ok(response) => response,
            Err(e) => {
                self.rollback(pending_at);
                return Err(ConversationError::Backend(e));
            }
        };

        self.session
            .add_message(Role::Assistant, response.content.clone());
        self.pending = None;

        Ok(Reply {
            content: response.content,
            usage: response.usage.map(|u| TurnUsage {
                prompt: u.prompt_tokens,
                completion: u.completion_tokens,
                total: u.total_tokens,
            }),
            turn_number: self.session.turn_count(),
        })
    }

    /// Process a single conversation turn: append, reply, persist.
    ///
    /// A failed save does not fail the turn; it is reported in
    /// `TurnResult::persist_error`.
    pub async fn process_turn(&mut self, user_input: &str) -> Result<TurnResult, ConversationError> {
        info!(
            "Processing turn {} for session: {}",
            self.session.turn_count() + 1,
            self.config.session_key
        );

        self.append_user_message(user_input)?;
        let reply = self.request_reply().await?;

        let persist_error = match self.persist().await {
            Ok(()) => None,
            Err(ConversationError::Detached) => {
                debug!("Not saving {}", self.config.session_key);
                None
            }
            Err(e) => {
                warn!("Continuing without saving: {e}");
                Some(e.to_string())
            }
        };

        debug!("Turn {} completed successfully", reply.turn_number);

        Ok(TurnResult {
            response: reply.content,
            usage: reply.usage,
            turn_number: reply.turn_number,
            persist_error,
        })
    }

    /// Drop an unanswered user message and return to idle.
    pub fn discard_pending(&mut self) -> bool {
        self.state = SessionState::Idle;
        self.pending.take().is_some_and(|pending_at| {
            self.session.truncate(pending_at);
            true
        })
    }

    fn rollback(&mut self, pending_at: usize) {
        self.session.truncate(pending_at);
        self.pending = None;
    }

    /// Empty the transcript. Calling it again has no further effect.
    pub fn clear(&mut self) {
        self.session.clear();
        self.pending = None;
        self.state = SessionState::Idle;
        info!("Cleared session: {}", self.config.session_key);
    }

    /// Save the settled transcript under the session key.
    pub async fn persist(&self) -> Result<(), ConversationError> {
        if self.detached {
            return Err(ConversationError::Detached);
        }
        let snapshot = self.session.snapshot(self.settled_len(), &self.config.model);
        let json = serde_json::to_string(&snapshot)?;

        self.storage
            .put(&self.config.session_key, &json)
            .await
            .map_err(ConversationError::Storage)?;

        debug!(
            "Saved {} messages to {}",
            snapshot.messages.len(),
            self.config.session_key
        );
        Ok(())
    }

    /// Load the transcript saved under the session key. A missing record
    /// yields an empty transcript.
    pub async fn restore(&mut self) -> Result<(), ConversationError> {
        let stored = self
            .storage
            .get(&self.config.session_key)
            .await
            .map_err(ConversationError::Storage)?;

        match stored {
            Some(json) => {
                let snapshot: SessionSnapshot = serde_json::from_str(&json)?;
                self.apply_snapshot(snapshot);
            }
            None => self.start_empty(),
        }
        self.detached = false;
        Ok(())
    }

    fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        info!(
            "Restored {} messages for {}",
            snapshot.messages.len(),
            self.config.session_key
        );
        self.pending = None;
        self.state = SessionState::Idle;
        self.session.restore_from(snapshot);
    }

    fn start_empty(&mut self) {
        debug!("Starting {} with an empty transcript", self.config.session_key);
        self.pending = None;
        self.state = SessionState::Idle;
        self.session.clear();
    }
}
