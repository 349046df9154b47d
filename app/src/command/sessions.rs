use lyla_config::Config;
use lyla_core::KeyValueStore;

use super::{SESSION_PREFIX, open_store};

/// Strategy for listing saved conversations.
#[derive(Debug, Clone, Copy)]
pub struct SessionsStrategy;

impl super::CommandStrategy for SessionsStrategy {
    type Input = Config;

    async fn execute(&self, config: Self::Input) -> anyhow::Result<()> {
        let store = open_store(&config, false).await?;
        let keys = store.list(SESSION_PREFIX).await?;

        if keys.is_empty() {
            println!("No saved sessions.");
            return Ok(());
        }

        for key in keys {
            println!("{}", key.strip_prefix(SESSION_PREFIX).unwrap_or(&key));
        }
        Ok(())
    }
}
