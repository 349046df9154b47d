#![warn(
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

mod error;
mod schema;

pub use error::ConfigError;
pub use schema::{
    ChatConfig, Config, GitHubStorageConfig, ImageConfig, LoggingConfig, ProfileConfig,
    ProviderConfig, ProvidersConfig, StorageBackend, StorageConfig,
};
