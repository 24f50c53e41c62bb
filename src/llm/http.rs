//! OpenAI-compatible HTTP completion client.

use super::CompletionProvider;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP timeout configuration for completion requests.
#[derive(Debug, Clone)]
pub struct CompletionHttpConfig {
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for CompletionHttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl CompletionHttpConfig {
    /// Loads timeouts from `REPOLENS_COMPLETION_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("REPOLENS_COMPLETION_CONNECT_TIMEOUT_MS")
            && let Ok(ms) = val.parse()
        {
            config.connect_timeout_ms = ms;
        }
        if let Ok(val) = std::env::var("REPOLENS_COMPLETION_TIMEOUT_MS")
            && let Ok(ms) = val.parse()
        {
            config.request_timeout_ms = ms;
        }
        config
    }
}

fn build_http_client(config: &CompletionHttpConfig) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .unwrap_or_default()
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct HttpCompletionClient {
    api_key: Option<String>,
    endpoint: String,
    model: String,
    max_tokens: u32,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl HttpCompletionClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    /// Creates a client from environment configuration
    /// (`OPENAI_API_KEY`, `REPOLENS_COMPLETION_ENDPOINT`,
    /// `REPOLENS_COMPLETION_MODEL`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            endpoint: std::env::var("REPOLENS_COMPLETION_ENDPOINT")
                .unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string()),
            model: std::env::var("REPOLENS_COMPLETION_MODEL")
                .unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string()),
            max_tokens: 512,
            client: build_http_client(&CompletionHttpConfig::from_env()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the completion token cap.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets HTTP timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: &CompletionHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    fn provider_err(cause: impl Into<String>) -> Error {
        Error::External {
            provider: "completion".to_string(),
            cause: cause.into(),
        }
    }
}

impl Default for HttpCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionProvider for HttpCompletionClient {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn complete(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Self::provider_err("OPENAI_API_KEY not set"))?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .map_err(|e| Self::provider_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::provider_err(format!(
                "HTTP {} from completion endpoint",
                response.status()
            )));
        }

        let body: ChatResponse = response
            .json()
            .map_err(|e| Self::provider_err(format!("malformed response: {e}")))?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Self::provider_err("empty choices"))
    }
}
