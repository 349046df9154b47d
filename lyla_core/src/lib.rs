#![warn(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod util;

pub use util::{CHAT_MODELS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, IMAGE_MODELS, mask_secret};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Message stamped with the current time, as stored in a transcript.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Message without a timestamp, used for prompts built per request.
    #[must_use]
    pub fn untimed(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    /// Wire form sent to chat backends (role and content only).
    #[must_use]
    pub fn to_llm_format(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "content": &self.content,
        })
    }
}

/// A single chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: usize,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw bytes returned by an image backend.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl GeneratedImage {
    /// File extension matching the content type, `jpg` when unknown.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
        {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        }
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LLMResponse>;
    fn get_default_model(&self) -> &str;
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> anyhow::Result<GeneratedImage>;
    fn get_default_model(&self) -> &str;
}

/// Keyed storage of opaque serialized records.
///
/// `get` on an absent key returns `Ok(None)`. Writers are last-writer-wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    /// Returns whether a record was removed.
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;
    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
impl<T: LLMProvider + ?Sized> LLMProvider for Arc<T> {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LLMResponse> {
        (**self).chat(request).await
    }

    fn get_default_model(&self) -> &str {
        (**self).get_default_model()
    }
}

#[async_trait]
impl<T: ImageProvider + ?Sized> ImageProvider for Arc<T> {
    async fn generate(&self, prompt: &str, model: &str) -> anyhow::Result<GeneratedImage> {
        (**self).generate(prompt, model).await
    }

    fn get_default_model(&self) -> &str {
        (**self).get_default_model()
    }
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        (**self).delete(key).await
    }

    async fn list(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        (**self).list(prefix).await
    }
}
