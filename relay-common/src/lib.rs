//! Relay Common - Shared configuration, errors, and logging for the relay bot.
//!
//! This crate provides:
//! - Environment-driven configuration with defaults and validation
//! - The configuration error type
//! - Logging setup and trace ID helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, DiscordConfig, HistoryConfig, LlmConfig, ObservabilityConfig};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
