//! OpenAI chat completions client.

use super::{CompletionClient, CompletionError, CompletionRequest};
use crate::message::Turn;
use async_trait::async_trait;
use relay_common::config::LlmConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI (or compatible) chat completions client.
pub struct OpenAIClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIClient {
    /// Create a client for an OpenAI-compatible API at `base_url`.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::with_base_url(
            config.api_key.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = OpenAIRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling completion API"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::debug!(
            model = %request.model,
            latency_ms = start.elapsed().as_millis() as u64,
            total_tokens = parsed.usage.map_or(0, |u| u.total_tokens),
            "Completion received"
        );

        Ok(content)
    }
}

/// Pull `error.message` out of an OpenAI error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<OpenAIErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorBody {
    error: OpenAIErrorDetail,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}
