use lyla_config::Config;
use lyla_conversation::session_key;
use lyla_core::KeyValueStore;

use super::open_store;

#[derive(Debug, Clone)]
pub struct ClearInput {
    pub config: Config,
    pub username: String,
    pub profile: Option<String>,
}

/// Strategy for deleting a saved conversation.
#[derive(Debug, Clone, Copy)]
pub struct ClearStrategy;

impl super::CommandStrategy for ClearStrategy {
    type Input = ClearInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        if input.username.trim().is_empty() {
            anyhow::bail!("A username is required to clear a session");
        }

        let key = session_key(Some(&input.username), input.profile.as_deref());
        let store = open_store(&input.config, false).await?;

        if store.delete(&key).await? {
            println!("Deleted session {key}");
        } else {
            println!("No saved session {key}");
        }
        Ok(())
    }
}
