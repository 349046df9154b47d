//! Static strategy pattern for CLI commands.
//!
//! Each command is a separate strategy with its own input type, dispatched
//! statically from `main`.

use lyla_config::{Config, StorageBackend};
use lyla_core::KeyValueStore;
use lyla_providers::GroqProvider;
use lyla_store::{DatabaseStore, FileStore, GitHubStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod chat;
mod clear;
mod image;
mod info;
mod init;
mod sessions;
mod version;

pub use chat::{ChatInput, ChatStrategy};
pub use clear::{ClearInput, ClearStrategy};
pub use image::{ImageInput, ImageStrategy};
pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use sessions::SessionsStrategy;
pub use version::VersionStrategy;

/// Prefix shared by every chat session key.
const SESSION_PREFIX: &str = "chat/";

/// Core trait defining the contract for all command strategies.
///
/// Each strategy defines its own input type via the associated type, so
/// adding a command only requires implementing this trait.
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Execute the command with the given input.
    ///
    /// # Errors
    /// Returns an error if command execution fails.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}

/// Open the session store selected by `storage.backend`.
///
/// `ephemeral` forces an in-memory store that is dropped on exit.
async fn open_store(config: &Config, ephemeral: bool) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    if ephemeral {
        info!("Using in-memory session store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store: Arc<dyn KeyValueStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => {
            let dir = config.sessions_dir()?;
            info!("Using file session store at {}", dir.display());
            Arc::new(FileStore::new(dir))
        }
        StorageBackend::Database => {
            if config.storage.database_url.is_none() {
                Config::ensure_config_dir()?;
            }
            Arc::new(DatabaseStore::new(&config.database_url()?).await?)
        }
        StorageBackend::Github => Arc::new(github_store(config)?),
    };
    Ok(store)
}

/// GitHub client for `storage.github`, used for sessions and image uploads.
fn github_store(config: &Config) -> anyhow::Result<GitHubStore> {
    let github = &config.storage.github;
    let (token, repo) = config.require_github()?;
    let mut store = GitHubStore::new(
        token.to_string(),
        repo.to_string(),
        github.dir.clone(),
        github.branch.clone(),
    );
    if let Some(api_url) = &github.api_url {
        store = store.with_base_url(api_url.clone());
    }
    Ok(store)
}

/// Chat backend configured from `providers.groq`.
fn chat_provider(config: &Config) -> anyhow::Result<GroqProvider> {
    let groq = &config.providers.groq;
    let mut provider = GroqProvider::new(config.require_groq_key()?.to_string());
    if let Some(base_url) = &groq.base_url {
        provider = provider.with_base_url(base_url.clone());
    }
    provider.with_timeout(Duration::from_secs(groq.timeout_secs))
}
