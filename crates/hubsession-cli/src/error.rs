//! Error handling for the hub session CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Session error: {0}")]
    Session(#[from] hubsession_core::HubSessionError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] hubsession_runtime::RuntimeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script error on line {line}: {reason}")]
    Script { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML encoding error: {0}")]
    TomlEncoding(#[from] toml::ser::Error),
}

impl From<hubsession_core::ConfigError> for CliError {
    fn from(err: hubsession_core::ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
