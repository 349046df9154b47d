use async_trait::async_trait;
use lyla_core::{GeneratedImage, IMAGE_MODELS, ImageProvider};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use std::time::Duration;
use tracing::info;

/// Text-to-image client for the Hugging Face Inference API.
pub struct HuggingFaceImageProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl HuggingFaceImageProvider {
    pub fn new(api_key: String) -> Self {
        info!("Creating HuggingFaceImageProvider");
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api-inference.huggingface.co".to_string(),
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

    /// Resolve a catalog display name to its model id; anything else is
    /// taken as a model id already.
    #[must_use]
    pub fn resolve_model(name: &str) -> &str {
        IMAGE_MODELS
            .iter()
            .find(|(display, _)| display.eq_ignore_ascii_case(name))
            .map_or(name, |(_, id)| *id)
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceImageProvider {
    async fn generate(&self, prompt: &str, model: &str) -> anyhow::Result<GeneratedImage> {
        let model = Self::resolve_model(model);
        info!("Requesting image from Hugging Face: model={model}");

        let response = self
            .client
            .post(format!("{}/models/{model}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": prompt }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Hugging Face API returned {status}: {}", text.trim());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        if content_type.starts_with("application/json") {
            let text = response.text().await?;
            anyhow::bail!("Hugging Face API returned no image: {}", text.trim());
        }

        let bytes = response.bytes().await?.to_vec();
        if bytes.is_empty() {
            anyhow::bail!("Hugging Face API returned an empty image");
        }

        info!("Received {} image bytes ({content_type})", bytes.len());
        Ok(GeneratedImage {
            bytes,
            content_type,
        })
    }

    fn get_default_model(&self) -> &'static str {
        IMAGE_MODELS[0].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_display_names() {
        assert_eq!(
            HuggingFaceImageProvider::resolve_model("flux.1"),
            "black-forest-labs/FLUX.1-schnell"
        );
        assert_eq!(
            HuggingFaceImageProvider::resolve_model("someone/custom-model"),
            "someone/custom-model"
        );
    }

    #[tokio::test]
    async fn generate_returns_image_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/runwayml/stable-diffusion-v1-5")
            .match_header("authorization", "Bearer hf-token")
            .match_body(mockito::Matcher::Json(json!({ "inputs": "a red fox" })))
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0x89, b'P', b'N', b'G'])
            .create_async()
            .await;

        let provider =
            HuggingFaceImageProvider::new("hf-token".to_string()).with_base_url(server.url());
        let image = provider
            .generate("a red fox", "Stable Diffusion v1.5")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(image.bytes, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(image.extension(), "png");
    }

    #[tokio::test]
    async fn generate_surfaces_loading_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/models/black-forest-labs/FLUX.1-schnell")
            .with_status(503)
            .with_body(r#"{"error":"Model is currently loading"}"#)
            .create_async()
            .await;

        let provider = HuggingFaceImageProvider::new("t".to_string()).with_base_url(server.url());
        let err = provider
            .generate("x", "black-forest-labs/FLUX.1-schnell")
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("503"), "{err}");
        assert!(err.contains("loading"), "{err}");
    }
}
