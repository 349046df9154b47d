//! Prompt-to-image command.

use chrono::{DateTime, Local, TimeZone};
use lyla_config::{Config, StorageBackend};
use lyla_core::ImageProvider;
use lyla_providers::HuggingFaceImageProvider;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
static CONTROL_CHARS: OnceLock<Regex> = OnceLock::new();
static RESERVED_CHARS: OnceLock<Regex> = OnceLock::new();

const MAX_PROMPT_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct ImageInput {
    pub config: Config,
    pub prompt: String,
    /// Catalog name or model id
    pub model: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Also commit the image to the GitHub repository
    pub upload: bool,
}

/// Strategy for generating an image and saving it to disk.
#[derive(Debug, Clone, Copy)]
pub struct ImageStrategy;

impl super::CommandStrategy for ImageStrategy {
    type Input = ImageInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let prompt = input.prompt.trim();
        if prompt.is_empty() {
            anyhow::bail!("Prompt is empty");
        }

        let config = &input.config;
        let huggingface = &config.providers.huggingface;
        let mut provider =
            HuggingFaceImageProvider::new(config.require_huggingface_key()?.to_string());
        if let Some(base_url) = &huggingface.base_url {
            provider = provider.with_base_url(base_url.clone());
        }
        let provider = provider.with_timeout(Duration::from_secs(huggingface.timeout_secs))?;

        let model = input.model.as_deref().unwrap_or(&config.image.model);
        println!("Generating image with {model}...");
        let image = provider.generate(prompt, model).await?;

        let dir = match input.output_dir {
            Some(dir) => dir,
            None => config.image_output_dir()?,
        };
        std::fs::create_dir_all(&dir)?;

        let filename = image_filename(prompt, &Local::now(), image.extension());
        let path = dir.join(&filename);
        std::fs::write(&path, &image.bytes)?;

        info!("Saved {} bytes to {}", image.bytes.len(), path.display());
        println!("Image saved to {}", path.display());

        if should_upload(config, input.upload) {
            let store = super::github_store(config)?;
            let repo_path = upload_path(&config.storage.github.images_dir, &filename);
            let location = store
                .upload_file(&repo_path, &image.bytes, &format!("Add image {filename}"))
                .await?;
            println!("Image uploaded to {location}");
        }
        Ok(())
    }
}

/// Images go to GitHub when asked, or whenever sessions are kept there.
fn should_upload(config: &Config, requested: bool) -> bool {
    requested || config.storage.backend == StorageBackend::Github
}

fn upload_path(images_dir: &str, filename: &str) -> String {
    let dir = images_dir.trim_matches('/');
    if dir.is_empty() {
        filename.to_string()
    } else {
        format!("{dir}/{filename}")
    }
}

#[expect(
    clippy::expect_used,
    reason = "Static regex patterns are known to be valid"
)]
fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("Static regex pattern is valid"))
}

/// Filesystem-safe form of a prompt: word characters, `-` and `_` only.
fn safe_prompt(prompt: &str) -> String {
    let safe = pattern(&UNSAFE_CHARS, r"[^\w\s-]").replace_all(prompt, "");
    let safe = safe.replace([' ', '/'], "_");
    let safe = pattern(&CONTROL_CHARS, r"[\n\r\t]").replace_all(&safe, "");
    let safe: String = safe.chars().take(MAX_PROMPT_CHARS).collect();

    if safe.trim_matches('_').is_empty() {
        return "image".to_string();
    }
    safe
}

/// `<safe_prompt>_<YYYY-MM-DD_HH-MM-SS>.<ext>`
fn image_filename<Tz>(prompt: &str, at: &DateTime<Tz>, extension: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let filename = format!(
        "{}_{}.{extension}",
        safe_prompt(prompt),
        at.format("%Y-%m-%d_%H-%M-%S")
    );
    pattern(&RESERVED_CHARS, r#"[\\/*?:"<>|]"#)
        .replace_all(&filename, "")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 14, 5, 9).unwrap()
    }

    #[test]
    fn filename_from_prompt_and_time() {
        assert_eq!(
            image_filename("a cat on the moon", &at(), "jpg"),
            "a_cat_on_the_moon_2024-09-01_14-05-09.jpg"
        );
    }

    #[test]
    fn filename_has_no_separators_or_reserved_chars() {
        let name = image_filename("../etc/passwd: <x> | \"y\"?*\\\tz\n", &at(), "png");

        assert!(!name.contains(['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\n', '\t']));
        assert!(!name.contains(".."));
        assert!(name.ends_with("_2024-09-01_14-05-09.png"));
    }

    #[test]
    fn keeps_unicode_word_characters() {
        assert_eq!(safe_prompt("café-au-lait"), "café-au-lait");
    }

    #[test]
    fn blank_after_cleaning_falls_back() {
        assert_eq!(safe_prompt("!!!"), "image");
    }

    #[test]
    fn long_prompts_are_truncated() {
        let prompt = "word ".repeat(100);
        assert_eq!(safe_prompt(&prompt).chars().count(), MAX_PROMPT_CHARS);
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let input = ImageInput {
            config: Config::default(),
            prompt: "   ".to_string(),
            model: None,
            output_dir: Some(dir.path().to_path_buf()),
            upload: false,
        };

        let err = super::super::CommandStrategy::execute(&ImageStrategy, input)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Prompt is empty");
    }

    #[test]
    fn uploads_when_flagged_or_backend_is_github() {
        let mut config = Config::default();
        assert!(!should_upload(&config, false));
        assert!(should_upload(&config, true));

        config.storage.backend = StorageBackend::Github;
        assert!(should_upload(&config, false));
    }

    #[test]
    fn upload_path_joins_images_dir() {
        assert_eq!(upload_path("images", "a.jpg"), "images/a.jpg");
        assert_eq!(upload_path("/art/lyla/", "a.jpg"), "art/lyla/a.jpg");
        assert_eq!(upload_path("", "a.jpg"), "a.jpg");
    }

    #[tokio::test]
    async fn generated_image_is_saved_and_uploaded() {
        let mut server = mockito::Server::new_async().await;
        let _generate = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0x89_u8, b'P', b'N', b'G'])
            .create_async()
            .await;
        let upload = server
            .mock(
                "PUT",
                mockito::Matcher::Regex(
                    r"^/repos/owner/data/contents/images/a_fox_.*\.png$".to_string(),
                ),
            )
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "branch": "main",
            })))
            .with_status(201)
            .with_body(r#"{"content":{"path":"images/a_fox.png","download_url":null}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.providers.huggingface.api_key = "hf-token".to_string();
        config.providers.huggingface.base_url = Some(server.url());
        config.storage.github.token = "gh-token".to_string();
        config.storage.github.repo = "owner/data".to_string();
        config.storage.github.api_url = Some(server.url());

        let input = ImageInput {
            config,
            prompt: "a fox".to_string(),
            model: None,
            output_dir: Some(dir.path().to_path_buf()),
            upload: true,
        };
        super::super::CommandStrategy::execute(&ImageStrategy, input)
            .await
            .unwrap();

        upload.assert_async().await;
        let saved: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(saved.len(), 1);
    }

    #[tokio::test]
    async fn upload_without_repo_is_a_config_error() {
        let mut server = mockito::Server::new_async().await;
        let _generate = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body([0x89_u8, b'P', b'N', b'G'])
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.providers.huggingface.api_key = "hf-token".to_string();
        config.providers.huggingface.base_url = Some(server.url());
        config.storage.github.token = "gh-token".to_string();

        let input = ImageInput {
            config,
            prompt: "a fox".to_string(),
            model: None,
            output_dir: Some(dir.path().to_path_buf()),
            upload: true,
        };
        let err = super::super::CommandStrategy::execute(&ImageStrategy, input)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("storage.github.repo"));
    }
}
