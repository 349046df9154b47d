//! Sessions persisted through real stores survive a new manager.

use async_trait::async_trait;
use lyla_conversation::{ConversationConfig, ConversationManager, SessionSnapshot};
use lyla_core::{ChatRequest, KeyValueStore, LLMProvider, LLMResponse, Role};
use lyla_store::{FileStore, MemoryStore};
use std::sync::Arc;

/// Answers with the number of messages it was sent.
struct CountingProvider;

#[async_trait]
impl LLMProvider for CountingProvider {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LLMResponse> {
        Ok(LLMResponse {
            content: format!("saw {}", request.messages.len()),
            usage: None,
        })
    }

    fn get_default_model(&self) -> &str {
        "test-model"
    }
}

fn config(user: &str) -> ConversationConfig {
    ConversationConfig::default()
        .with_username(Some(user.to_string()))
        .with_model("test-model".to_string())
        .with_history_limit(4)
}

#[tokio::test]
async fn file_store_session_resumes_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));

    {
        let mut manager =
            ConversationManager::open(Arc::new(CountingProvider), store.clone(), config("alice"))
                .await
                .unwrap();
        manager.process_turn("hello").await.unwrap();
        manager.process_turn("how are you").await.unwrap();
    }

    let mut resumed =
        ConversationManager::open(Arc::new(CountingProvider), store.clone(), config("alice"))
            .await
            .unwrap();
    assert_eq!(resumed.session().message_count(), 4);
    assert_eq!(resumed.session().messages[0].content, "hello");

    // System prompt + 4-message window + new message
    let result = resumed.process_turn("still there?").await.unwrap();
    assert_eq!(result.response, "saw 6");
    assert_eq!(result.turn_number, 3);

    let keys = store.list("chat/").await.unwrap();
    assert_eq!(keys, vec!["chat/alice".to_string()]);

    let snapshot: SessionSnapshot =
        serde_json::from_str(&store.get("chat/alice").await.unwrap().unwrap()).unwrap();
    assert_eq!(snapshot.messages.len(), 6);
    assert_eq!(snapshot.messages[5].role, Role::Assistant);
    assert_eq!(snapshot.model.as_deref(), Some("test-model"));
}

#[tokio::test]
async fn users_do_not_share_transcripts() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let mut alice =
        ConversationManager::open(Arc::new(CountingProvider), store.clone(), config("alice"))
            .await
            .unwrap();
    alice.process_turn("I am alice").await.unwrap();

    let bob = ConversationManager::open(Arc::new(CountingProvider), store.clone(), config("bob"))
        .await
        .unwrap();

    assert!(bob.session().is_empty());
    assert_eq!(alice.session().message_count(), 2);
}

#[tokio::test]
async fn cleared_session_persists_empty() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    let mut manager =
        ConversationManager::open(Arc::new(CountingProvider), store.clone(), config("carol"))
            .await
            .unwrap();
    manager.process_turn("remember this").await.unwrap();
    manager.clear();
    manager.persist().await.unwrap();

    let reopened = ConversationManager::open(Arc::new(CountingProvider), store, config("carol"))
        .await
        .unwrap();
    assert!(reopened.session().is_empty());
}
