//! Multi-turn conversation command with persistent sessions.

use lyla_config::Config;
use lyla_conversation::{
    ConversationConfig, ConversationError, ConversationManager, HistoryManager, Profile,
};
use lyla_core::{KeyValueStore, LLMProvider, Role};
use lyla_store::MemoryStore;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use super::{chat_provider, open_store};

/// Input parameters for the Chat command strategy.
#[derive(Debug, Clone)]
pub struct ChatInput {
    pub config: Config,
    /// Named users resume their saved conversation
    pub username: Option<String>,
    /// Profile id from the config's `profiles` table
    pub profile: Option<String>,
    /// Optional single message to send (non-interactive mode)
    pub message: Option<String>,
    /// Optional model override
    pub model: Option<String>,
    /// Number of messages to keep in context
    pub history_limit: Option<usize>,
    /// Keep the session in memory only
    pub ephemeral: bool,
}

/// Strategy for executing the Chat command.
///
/// Resumes (or starts) the session for the user and profile, then answers a
/// single message or runs an interactive loop.
#[derive(Debug, Clone, Copy)]
pub struct ChatStrategy;

impl super::CommandStrategy for ChatStrategy {
    type Input = ChatInput;

    async fn execute(&self, input: Self::Input) -> anyhow::Result<()> {
        let provider = chat_provider(&input.config)?;
        let conversation_config = build_conversation_config(&input)?;
        let store = open_session_store(&input.config, input.ephemeral).await;

        info!(
            "Starting conversation session: {}",
            conversation_config.session_key
        );

        let (mut manager, warning) =
            ConversationManager::open_or_recover(provider, store, conversation_config).await;
        if let Some(e) = warning {
            eprintln!("Warning: {e}");
            if manager.is_saving() {
                eprintln!("Starting a new conversation; the unreadable record was kept aside.");
            } else {
                eprintln!("Starting a new conversation that will not be saved.");
            }
        }

        if let Some(msg) = input.message {
            let result = manager.process_turn(&msg).await?;
            println!("{}", result.response);
            if let Some(err) = result.persist_error {
                eprintln!("Warning: conversation not saved: {err}");
            }
        } else {
            run_interactive(&mut manager, &input.config.chat.models).await?;
            info!(
                "Conversation ended: {} total messages",
                manager.session().message_count()
            );
        }

        Ok(())
    }
}

/// The configured store, or an unsaved in-memory one when it cannot be opened.
async fn open_session_store(config: &Config, ephemeral: bool) -> Arc<dyn KeyValueStore> {
    match open_store(config, ephemeral).await {
        Ok(store) => store,
        Err(e) => {
            warn!("Session store unavailable, using memory: {e:#}");
            eprintln!(
                "Warning: session storage unavailable ({e:#}); this conversation will not be saved"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

fn build_conversation_config(input: &ChatInput) -> anyhow::Result<ConversationConfig> {
    let config = &input.config;

    let profile = input
        .profile
        .as_deref()
        .map(|id| {
            config.profile(id).map(|p| Profile {
                id: id.to_string(),
                name: p.name.clone(),
                context: p.context.clone(),
                data: p.data.clone(),
            })
        })
        .transpose()?;

    let history_limit = input.history_limit.unwrap_or(config.chat.history_limit);
    if history_limit == 0 {
        anyhow::bail!("History limit must be at least 1");
    }

    Ok(ConversationConfig::default()
        .with_username(input.username.clone())
        .with_profile(profile)
        .with_model(
            input
                .model
                .clone()
                .unwrap_or_else(|| config.chat.model.clone()),
        )
        .with_system_prompt(config.chat.system_prompt().to_string())
        .with_history_limit(history_limit)
        .with_sampling(config.chat.temperature, config.chat.max_tokens)
        .with_top_p(config.chat.top_p))
}

/// A line typed at the interactive prompt.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Exit,
    Clear,
    Model(Option<&'a str>),
    Models,
    History,
    Help,
    Unknown(&'a str),
    Message(&'a str),
}

impl<'a> ChatCommand<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if matches!(line, "exit" | "quit" | "q") {
            return Some(Self::Exit);
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Message(line));
        };

        let (name, arg) = command
            .split_once(char::is_whitespace)
            .map_or((command, None), |(name, arg)| (name, Some(arg.trim())));

        Some(match name {
            "clear" => Self::Clear,
            "model" => Self::Model(arg.filter(|a| !a.is_empty())),
            "models" => Self::Models,
            "history" => Self::History,
            "help" => Self::Help,
            "exit" | "quit" => Self::Exit,
            _ => Self::Unknown(name),
        })
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /clear          start over (forgets this conversation)");
    println!("  /model [NAME]   show or switch the chat model");
    println!("  /models         list available models");
    println!("  /history        show the conversation so far");
    println!("  /help           show this help");
    println!("  exit, quit, q   end the session");
}

async fn run_interactive<P, S>(
    manager: &mut ConversationManager<P, S>,
    models: &[String],
) -> anyhow::Result<()>
where
    P: LLMProvider + Send + Sync,
    S: KeyValueStore + Send + Sync,
{
    println!("=== Lyla: {} ===", manager.config().session_key);
    println!("Model: {}", manager.model());
    if !manager.session().is_empty() {
        println!(
            "Resumed conversation with {} messages.",
            manager.session().message_count()
        );
    }
    println!("Type /help for commands, 'exit' to end the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout())?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match ChatCommand::parse(&line) {
            None => {}
            Some(ChatCommand::Exit) => break,
            Some(ChatCommand::Clear) => {
                manager.clear();
                if manager.is_saving()
                    && let Err(e) = manager.persist().await
                {
                    warn!("Failed to save cleared session: {e}");
                    eprintln!("Warning: conversation not saved: {e}");
                }
                println!("Conversation cleared.\n");
            }
            Some(ChatCommand::Model(None)) => println!("Current model: {}\n", manager.model()),
            Some(ChatCommand::Model(Some(name))) => {
                if !models.iter().any(|m| m == name) {
                    println!("Note: {name} is not in the configured model list.");
                }
                manager.set_model(name.to_string());
                println!("Model set to {name}\n");
            }
            Some(ChatCommand::Models) => {
                for model in models {
                    let marker = if model == manager.model() { "*" } else { " " };
                    println!(" {marker} {model}");
                }
                println!();
            }
            Some(ChatCommand::History) => {
                let messages = &manager.session().messages;
                for message in messages {
                    let speaker = match message.role {
                        Role::User => "You",
                        Role::Assistant => "Lyla",
                        Role::System => "System",
                    };
                    println!("{speaker}: {}", message.content);
                }
                let stats = HistoryManager::stats(messages);
                println!(
                    "({} messages, ~{} tokens, {} sent as context)\n",
                    stats.total_messages,
                    stats.estimated_tokens,
                    manager.memory_window().len()
                );
            }
            Some(ChatCommand::Help) => print_help(),
            Some(ChatCommand::Unknown(name)) => {
                println!("Unknown command: /{name}. Type /help for commands.");
            }
            Some(ChatCommand::Message(text)) => {
                let turn = tokio::select! {
                    result = manager.process_turn(text) => Some(result),
                    _ = tokio::signal::ctrl_c() => None,
                };

                match turn {
                    Some(Ok(result)) => {
                        println!("\nLyla: {}\n", result.response);
                        if let Some(err) = result.persist_error {
                            eprintln!("Warning: conversation not saved: {err}");
                        }
                        if let Some(usage) = result.usage {
                            debug!(
                                "Tokens: {} prompt + {} completion = {} total",
                                usage.prompt, usage.completion, usage.total
                            );
                        }
                    }
                    Some(Err(ConversationError::EmptyMessage)) => {}
                    Some(Err(e)) => eprintln!("Error: {e}"),
                    None => {
                        manager.discard_pending();
                        println!("\n(cancelled)\n");
                    }
                }
            }
        }
    }

    println!(
        "Session ended. Total turns: {}",
        manager.session().turn_count()
    );
    Ok(())
}
