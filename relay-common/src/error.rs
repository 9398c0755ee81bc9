//! Error types for relay configuration and startup.

use thiserror::Error;

/// Result type alias using the relay error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Startup error. Any of these aborts the process before the gateway connects.
#[derive(Error, Debug)]
pub enum Error {
    /// A required environment variable is unset or empty
    #[error("[ERROR] {0} not found! Please set it in the environment.")]
    MissingEnv(String),

    /// An environment variable could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a missing credential error.
    pub const fn is_missing_env(&self) -> bool {
        matches!(self, Self::MissingEnv(_))
    }
}
