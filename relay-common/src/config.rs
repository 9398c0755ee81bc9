//! Configuration for the relay bot.
//!
//! Everything is read from the process environment. The two credentials
//! (`DISCORD_TOKEN`, `OPENAI_API_KEY`) are required; every other setting has a
//! default matching the bot's stock behavior.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Discord bot token.
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";
/// Completion API key.
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
/// Completion API base URL (for OpenAI-compatible providers).
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "RELAY_MODEL";
pub const ENV_MAX_HISTORY: &str = "RELAY_MAX_HISTORY";
pub const ENV_MAX_TOKENS: &str = "RELAY_MAX_TOKENS";
pub const ENV_TEMPERATURE: &str = "RELAY_TEMPERATURE";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "RELAY_REQUEST_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "RELAY_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "RELAY_LOG_FORMAT";

/// Root configuration structure.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Discord gateway settings
    pub discord: DiscordConfig,

    /// Completion API settings
    pub llm: LlmConfig,

    /// Per-user conversation window
    pub history: HistoryConfig,

    /// Logging settings
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Fails if either credential is missing, a value does not parse, or the
    /// result does not validate.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(&lookup)?;
        config.require_credentials()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup onto the current values.
    pub fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = non_empty(lookup, ENV_DISCORD_TOKEN) {
            self.discord.bot_token = token;
        }
        if let Some(key) = non_empty(lookup, ENV_OPENAI_API_KEY) {
            self.llm.api_key = key;
        }
        if let Some(url) = non_empty(lookup, ENV_OPENAI_BASE_URL) {
            self.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = non_empty(lookup, ENV_MODEL) {
            self.llm.model = model;
        }
        if let Some(max_tokens) = parse_var(lookup, ENV_MAX_TOKENS)? {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = parse_var(lookup, ENV_TEMPERATURE)? {
            self.llm.temperature = temperature;
        }
        if let Some(timeout) = parse_var(lookup, ENV_REQUEST_TIMEOUT_SECS)? {
            self.llm.request_timeout_secs = timeout;
        }
        if let Some(max_turns) = parse_var(lookup, ENV_MAX_HISTORY)? {
            self.history.max_turns = max_turns;
        }
        if let Some(level) = non_empty(lookup, ENV_LOG_LEVEL) {
            self.observability.log_level = level;
        }
        if let Some(format) = non_empty(lookup, ENV_LOG_FORMAT) {
            self.observability.log_format = format;
        }
        Ok(())
    }

    /// Both credentials must be present. The Discord token is checked first.
    pub fn require_credentials(&self) -> Result<()> {
        if self.discord.bot_token.is_empty() {
            return Err(Error::MissingEnv(ENV_DISCORD_TOKEN.into()));
        }
        if self.llm.api_key.is_empty() {
            return Err(Error::MissingEnv(ENV_OPENAI_API_KEY.into()));
        }
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.history.max_turns == 0 {
            return Err(Error::Config(format!("{ENV_MAX_HISTORY} must be at least 1")));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Config(format!(
                "{ENV_TEMPERATURE} must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(Error::Config(format!("{ENV_MAX_TOKENS} must be at least 1")));
        }
        if !matches!(self.observability.log_format.as_str(), "pretty" | "json") {
            return Err(Error::Config(format!(
                "{ENV_LOG_FORMAT} must be \"pretty\" or \"json\", got {:?}",
                self.observability.log_format
            )));
        }
        Ok(())
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map(Some).map_err(|_| Error::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(None),
    }
}

/// Discord configuration.
#[derive(Clone, Default)]
pub struct DiscordConfig {
    /// Bot token used for both the gateway and REST calls
    pub bot_token: String,
}

impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &redact(&self.bot_token))
            .finish()
    }
}

/// Completion API configuration.
#[derive(Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Maximum output tokens per reply
    pub max_tokens: u32,
    pub temperature: f64,
    /// Whole-request timeout enforced inside the HTTP client
    pub request_timeout_secs: u64,
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Placeholder shown instead of a credential.
fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".into()
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Conversation window configuration.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Maximum turns remembered per user
    pub max_turns: usize,
}

fn default_max_turns() -> usize {
    20
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (json, pretty)
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] = [(ENV_DISCORD_TOKEN, "discord"), (ENV_OPENAI_API_KEY, "sk-test")];

    #[test]
    fn test_debug_output_hides_credentials() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_DISCORD_TOKEN, "discord-secret-token"),
            (ENV_OPENAI_API_KEY, "sk-secret-key"),
        ]))
        .unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("discord-secret-token"));
        assert!(!rendered.contains("sk-secret-key"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("gpt-3.5-turbo"));
        assert!(format!("{:?}", LlmConfig::default()).contains("<unset>"));
    }

    #[test]
    fn test_defaults_with_credentials() {
        let config = Config::from_lookup(lookup_from(&CREDENTIALS)).unwrap();
        assert_eq!(config.discord.bot_token, "discord");
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.max_tokens, 1000);
        assert!((config.llm.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.llm.base_url, "https://api.openai.com");
        assert_eq!(config.history.max_turns, 20);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.observability.log_format, "pretty");
    }

    #[test]
    fn test_missing_discord_token_is_reported_first() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ref key) if key == ENV_DISCORD_TOKEN));
    }

    #[test]
    fn test_missing_openai_key() {
        let err = Config::from_lookup(lookup_from(&[(ENV_DISCORD_TOKEN, "discord")])).unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ref key) if key == ENV_OPENAI_API_KEY));
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let err = Config::from_lookup(lookup_from(&[
            (ENV_DISCORD_TOKEN, "   "),
            (ENV_OPENAI_API_KEY, "sk-test"),
        ]))
        .unwrap_err();
        assert!(err.is_missing_env());
    }

    #[test]
    fn test_overrides_applied() {
        let config = Config::from_lookup(lookup_from(&[
            CREDENTIALS[0],
            CREDENTIALS[1],
            (ENV_MODEL, "gpt-4o"),
            (ENV_MAX_HISTORY, "6"),
            (ENV_MAX_TOKENS, "256"),
            (ENV_TEMPERATURE, "0.2"),
            (ENV_OPENAI_BASE_URL, "http://localhost:8080/"),
            (ENV_LOG_FORMAT, "json"),
        ]))
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.history.max_turns, 6);
        assert_eq!(config.llm.max_tokens, 256);
        assert!((config.llm.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.llm.base_url, "http://localhost:8080");
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_unparseable_number_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            CREDENTIALS[0],
            CREDENTIALS[1],
            (ENV_MAX_HISTORY, "twenty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { ref key, .. } if key == ENV_MAX_HISTORY));
    }

    #[test_case(ENV_MAX_HISTORY, "0" ; "zero history")]
    #[test_case(ENV_TEMPERATURE, "3.5" ; "temperature too high")]
    #[test_case(ENV_MAX_TOKENS, "0" ; "zero max tokens")]
    #[test_case(ENV_LOG_FORMAT, "xml" ; "unknown log format")]
    fn test_validation_rejects(key: &str, value: &str) {
        let err = Config::from_lookup(lookup_from(&[CREDENTIALS[0], CREDENTIALS[1], (key, value)]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
