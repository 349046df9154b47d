#![deny(
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

mod command;

use clap::{Parser, Subcommand};
use command::{
    ChatInput, ChatStrategy, ClearInput, ClearStrategy, CommandStrategy, ImageInput,
    ImageStrategy, InfoStrategy, InitStrategy, SessionsStrategy, VersionStrategy,
};
use lyla_config::Config;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "lyla")]
#[command(about = "Lyla: chat with a persistent assistant and generate images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with Lyla (interactive unless --message is given)
    Chat {
        /// Username; named users resume their saved conversation
        #[arg(short = 'u', long)]
        user: Option<String>,

        /// Profile id from the config file
        #[arg(short = 'p', long)]
        profile: Option<String>,

        /// Single message to send
        #[arg(short = 'm', long)]
        message: Option<String>,

        /// Model to use
        #[arg(short = 'M', long)]
        model: Option<String>,

        /// Number of recent messages sent as context
        #[arg(short = 'l', long)]
        history_limit: Option<usize>,

        /// Do not save the conversation
        #[arg(long)]
        ephemeral: bool,
    },
    /// Generate an image from a text prompt
    Image {
        prompt: String,

        /// Model name or id
        #[arg(short = 'M', long)]
        model: Option<String>,

        /// Directory to save the image in
        #[arg(short = 'o', long)]
        output_dir: Option<PathBuf>,

        /// Also upload the image to the configured GitHub repository
        #[arg(long)]
        upload: bool,
    },
    /// List saved sessions
    Sessions,
    /// Delete a saved session
    Clear {
        #[arg(short = 'u', long)]
        user: String,

        #[arg(short = 'p', long)]
        profile: Option<String>,
    },
    /// Show configuration information
    Info,
    /// Initialize configuration
    Init,
    /// Show version
    Version,
}

/// `LYLA_LOG`, then `RUST_LOG`, then the configured level.
fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env("LYLA_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging("warn")?;
            InitStrategy.execute(()).await?;
        }
        Commands::Version => VersionStrategy.execute(()).await?,
        command => {
            let config = Config::load()?;
            init_logging(&config.logging.level)?;
            run(command, config).await?;
        }
    }

    Ok(())
}

async fn run(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Chat {
            user,
            profile,
            message,
            model,
            history_limit,
            ephemeral,
        } => {
            ChatStrategy
                .execute(ChatInput {
                    config,
                    username: user,
                    profile,
                    message,
                    model,
                    history_limit,
                    ephemeral,
                })
                .await
        }
        Commands::Image {
            prompt,
            model,
            output_dir,
            upload,
        } => {
            ImageStrategy
                .execute(ImageInput {
                    config,
                    prompt,
                    model,
                    output_dir,
                    upload,
                })
                .await
        }
        Commands::Sessions => SessionsStrategy.execute(config).await,
        Commands::Clear { user, profile } => {
            ClearStrategy
                .execute(ClearInput {
                    config,
                    username: user,
                    profile,
                })
                .await
        }
        Commands::Info => InfoStrategy.execute(config).await,
        Commands::Init => InitStrategy.execute(()).await,
        Commands::Version => VersionStrategy.execute(()).await,
    }
}
