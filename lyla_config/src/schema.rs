use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use lyla_core::{CHAT_MODELS, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT, IMAGE_MODELS};

use crate::ConfigError;

pub const GROQ_API_KEY: &str = "GROQ_API_KEY";
pub const HUGGINGFACE_API_TOKEN: &str = "HUGGINGFACEHUB_API_TOKEN";
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const CONFIG_PATH_VAR: &str = "LYLA_CONFIG";

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "ChatConfig::default_model")]
    pub model: String,
    #[serde(default = "ChatConfig::default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "ChatConfig::default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Number of transcript messages forwarded to the backend each turn.
    #[serde(default = "ChatConfig::default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "ChatConfig::default_models")]
    pub models: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            max_tokens: Self::default_max_tokens(),
            temperature: Self::default_temperature(),
            top_p: None,
            system_prompt: None,
            history_limit: Self::default_history_limit(),
            models: Self::default_models(),
        }
    }
}

impl ChatConfig {
    fn default_model() -> String {
        DEFAULT_MODEL.to_string()
    }

    const fn default_max_tokens() -> usize {
        1024
    }

    const fn default_temperature() -> f32 {
        0.7
    }

    const fn default_history_limit() -> usize {
        100
    }

    fn default_models() -> Vec<String> {
        CHAT_MODELS.iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "ImageConfig::default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model: Self::default_model(),
            output_dir: None,
        }
    }
}

impl ImageConfig {
    fn default_model() -> String {
        IMAGE_MODELS[0].0.to_string()
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub groq: ProviderConfig,
    #[serde(default)]
    pub huggingface: ProviderConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "ProviderConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    const fn default_timeout_secs() -> u64 {
        60
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Database,
    Github,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Directory for the file backend; `~/lyla/sessions` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Connection URL for the database backend; a SQLite file under
    /// `~/lyla` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default)]
    pub github: GitHubStorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitHubStorageConfig {
    /// `owner/name` of the repository holding the records.
    #[serde(default)]
    pub repo: String,
    #[serde(default = "GitHubStorageConfig::default_dir")]
    pub dir: String,
    #[serde(default = "GitHubStorageConfig::default_branch")]
    pub branch: String,
    #[serde(default)]
    pub token: String,
    /// Repository directory for uploaded images.
    #[serde(default = "GitHubStorageConfig::default_images_dir")]
    pub images_dir: String,
    /// API root; `https://api.github.com` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Default for GitHubStorageConfig {
    fn default() -> Self {
        Self {
            repo: String::new(),
            dir: Self::default_dir(),
            branch: Self::default_branch(),
            token: String::new(),
            images_dir: Self::default_images_dir(),
            api_url: None,
        }
    }
}

impl GitHubStorageConfig {
    fn default_dir() -> String {
        "userdata".to_string()
    }

    fn default_branch() -> String {
        "main".to_string()
    }

    fn default_images_dir() -> String {
        "images".to_string()
    }
}

/// A persona the assistant takes on, with custom facts sent as context.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProfileConfig {
    pub name: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_string()
    }
}

impl Config {
    /// Load `.env`, then the config file (if any), then environment overrides.
    ///
    /// A missing config file is not an error: defaults are used and API keys
    /// may come from the environment alone.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenv::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        let config_path = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            info!("Loading config from {}", config_path.display());
            Self::from_file(&config_path)?
        } else {
            info!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {e}", path.display()))
    }

    pub fn from_json_str(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Overlay secrets from the environment. Non-empty variables win over
    /// values from the config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = read(GROQ_API_KEY) {
            self.providers.groq.api_key = key;
        }
        if let Some(key) = read(HUGGINGFACE_API_TOKEN) {
            self.providers.huggingface.api_key = key;
        }
        if let Some(token) = read(GITHUB_TOKEN) {
            self.storage.github.token = token;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "chat.history_limit must be at least 1".to_string(),
            ));
        }
        if self.chat.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_tokens must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::Invalid(format!(
                "chat.temperature must be within 0.0..=2.0, got {}",
                self.chat.temperature
            )));
        }
        if self.storage.backend == StorageBackend::Github && self.storage.github.repo.is_empty() {
            return Err(ConfigError::Invalid(
                "storage.github.repo is required for the github backend".to_string(),
            ));
        }
        Ok(())
    }

    pub fn require_groq_key(&self) -> Result<&str, ConfigError> {
        non_empty(&self.providers.groq.api_key).ok_or(ConfigError::MissingApiKey {
            name: GROQ_API_KEY,
            field: "providers.groq.api_key",
        })
    }

    pub fn require_huggingface_key(&self) -> Result<&str, ConfigError> {
        non_empty(&self.providers.huggingface.api_key).ok_or(ConfigError::MissingApiKey {
            name: HUGGINGFACE_API_TOKEN,
            field: "providers.huggingface.api_key",
        })
    }

    pub fn require_github_token(&self) -> Result<&str, ConfigError> {
        non_empty(&self.storage.github.token).ok_or(ConfigError::MissingApiKey {
            name: GITHUB_TOKEN,
            field: "storage.github.token",
        })
    }

    /// Token and repository needed for any GitHub write.
    pub fn require_github(&self) -> Result<(&str, &str), ConfigError> {
        let token = self.require_github_token()?;
        let repo = non_empty(&self.storage.github.repo).ok_or_else(|| {
            ConfigError::Invalid("storage.github.repo is required to use GitHub".to_string())
        })?;
        Ok((token, repo))
    }

    pub fn profile(&self, id: &str) -> Result<&ProfileConfig, ConfigError> {
        self.profiles
            .get(id)
            .ok_or_else(|| ConfigError::UnknownProfile(id.to_string()))
    }

    /// `~/lyla`, home of the config file and default data locations.
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        Ok(dirs::home_dir().ok_or(ConfigError::NoHomeDir)?.join("lyla"))
    }

    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::data_dir()?.join("config.json"))
    }

    pub fn sessions_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("sessions")),
        }
    }

    pub fn database_url(&self) -> Result<String, ConfigError> {
        match &self.storage.database_url {
            Some(url) => Ok(url.clone()),
            None => Ok(format!(
                "sqlite://{}?mode=rwc",
                Self::data_dir()?.join("sessions.db").display()
            )),
        }
    }

    pub fn image_output_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.image.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("images")),
        }
    }

    pub fn ensure_config_dir() -> anyhow::Result<PathBuf> {
        let config_dir = Self::data_dir()?;
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }

    pub fn create_config() -> anyhow::Result<()> {
        let config_dir = Self::ensure_config_dir()?;
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            anyhow::bail!(
                "Config file already exists at: {}. Please edit it directly.",
                config_path.display()
            );
        }

        std::fs::write(&config_path, CONFIG_TEMPLATE)?;

        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Next steps:");
        println!("   1. Set GROQ_API_KEY (and HUGGINGFACEHUB_API_TOKEN for images)");
        println!("      in your environment or a .env file, or edit the config file");
        println!("   2. Run 'lyla chat -u <name>' to start a conversation");
        println!("   3. Run 'lyla image \"<prompt>\"' to generate an image");
        println!();
        println!("Configuration options:");
        println!("   - chat.model: {}", CHAT_MODELS.join(", "));
        println!("   - chat.history_limit: messages forwarded as context each turn");
        println!("   - storage.backend: memory, file, database or github");
        println!("   - profiles: personas selectable with 'lyla chat -p <id>'");
        println!();
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

const CONFIG_TEMPLATE: &str = r#"{
  "chat": {
    "model": "gemma2-9b-it",
    "max_tokens": 1024,
    "temperature": 0.7,
    "history_limit": 100
  },
  "image": {
    "model": "Stable Diffusion v1.5"
  },
  "providers": {
    "groq": {
      "api_key": "",
      "timeout_secs": 60
    },
    "huggingface": {
      "api_key": "",
      "timeout_secs": 120
    }
  },
  "storage": {
    "backend": "file"
  },
  "profiles": {
    "classmate": {
      "name": "Classmate",
      "context": "You are Lyla. You are friendly and you behave like a human. You are having a casual conversation with your classmate.",
      "data": {
        "favorite_color": "blue",
        "hometown": "Springfield"
      }
    }
  },
  "logging": {
    "level": "warn"
  }
}"#;
