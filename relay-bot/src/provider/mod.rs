//! Completion client abstraction.
//!
//! The dispatcher only ever sees [`CompletionClient::complete`]; transport,
//! authentication, and timeouts stay inside the implementation.

mod openai;

pub use openai::OpenAIClient;

use crate::message::Turn;
use async_trait::async_trait;
use relay_common::config::LlmConfig;

/// A chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    /// Full prompt context, system turn first
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Sampling settings applied to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionSettings {
    pub fn request(&self, messages: Vec<Turn>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for CompletionSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Any failure to obtain a completion.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompletionError {
    /// Transport failure: DNS, TLS, connect, timeout
    #[error("Request failed: {0}")]
    Request(String),

    /// Non-success HTTP status from the API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Response had no reply text
    #[error("The model returned an empty response")]
    EmptyResponse,
}

impl CompletionError {
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }
}

/// Language-model completion client.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider name, for logs.
    fn name(&self) -> &str;

    /// Produce the assistant's reply text for a prompt context.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config_defaults() {
        let settings = CompletionSettings::default();
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert_eq!(settings.max_tokens, 1000);
        assert!((settings.temperature - 0.7).abs() < f64::EPSILON);

        let request = settings.request(vec![Turn::system("s")]);
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_error_classification() {
        let limited = CompletionError::Api {
            status: 429,
            message: "slow down".into(),
        };
        assert!(limited.is_rate_limited());
        assert_eq!(limited.status_code(), Some(429));
        assert_eq!(limited.to_string(), "API error (429): slow down");

        let timeout = CompletionError::Request("timed out".into());
        assert!(!timeout.is_rate_limited());
        assert_eq!(timeout.status_code(), None);
    }
}
