use async_trait::async_trait;
use lyla_core::{ChatRequest, LLMProvider, LLMResponse, Usage};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// OpenAI-compatible chat completions client for the Groq API.
pub struct GroqProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqProvider {
    pub fn new(api_key: String) -> Self {
        info!("Creating GroqProvider");
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.groq.com/openai/v1".to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> anyhow::Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(lyla_core::ChatMessage::to_llm_format)
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        body
    }

    fn parse_usage(response: &serde_json::Value) -> Option<Usage> {
        let field = |name: &str| {
            response["usage"][name]
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(0)
        };
        response["usage"].as_object().map(|_| Usage {
            prompt_tokens: field("prompt_tokens"),
            completion_tokens: field("completion_tokens"),
            total_tokens: field("total_tokens"),
        })
    }
}

#[async_trait]
impl LLMProvider for GroqProvider {
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<LLMResponse> {
        let body = Self::request_body(request);

        info!(
            "Sending request to Groq API: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            anyhow::bail!("Groq API returned {status}: {detail}");
        }

        let response = response.json::<serde_json::Value>().await?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format: missing content"))?
            .to_string();

        let usage = Self::parse_usage(&response);
        debug!("Groq usage: {usage:?}");

        info!("Received response from Groq API");
        Ok(LLMResponse { content, usage })
    }

    fn get_default_model(&self) -> &'static str {
        lyla_core::DEFAULT_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyla_core::{ChatMessage, Role};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gemma2-9b-it".to_string(),
            messages: vec![
                ChatMessage::untimed(Role::System, "be brief"),
                ChatMessage::new(Role::User, "hello"),
            ],
            temperature: 0.7,
            max_tokens: 256,
            top_p: Some(1.0),
        }
    }

    #[test]
    fn request_body_uses_wire_messages() {
        let body = GroqProvider::request_body(&request());
        assert_eq!(body["model"], "gemma2-9b-it");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body["messages"][1].get("timestamp").is_none());
        assert!(body.get("top_p").is_some());
    }

    #[tokio::test]
    async fn chat_parses_content_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"hi there"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#,
            )
            .create_async()
            .await;

        let provider = GroqProvider::new("test-key".to_string()).with_base_url(server.url());
        let response = provider.chat(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.content, "hi there");
        assert_eq!(
            response.usage,
            Some(Usage {
                prompt_tokens: 12,
                completion_tokens: 3,
                total_tokens: 15,
            })
        );
    }

    #[tokio::test]
    async fn chat_reports_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API Key"}}"#)
            .create_async()
            .await;

        let provider = GroqProvider::new("bad".to_string()).with_base_url(server.url());
        let err = provider.chat(&request()).await.unwrap_err().to_string();

        assert!(err.contains("401"), "{err}");
        assert!(err.contains("Invalid API Key"), "{err}");
    }

    #[tokio::test]
    async fn chat_rejects_missing_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let provider = GroqProvider::new("k".to_string()).with_base_url(server.url());
        assert!(provider.chat(&request()).await.is_err());
    }
}
