use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not set. Add it to your environment, a .env file, or {field} in the config file")]
    MissingApiKey {
        name: &'static str,
        field: &'static str,
    },

    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot find home directory")]
    NoHomeDir,
}
