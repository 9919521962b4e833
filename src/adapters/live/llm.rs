//! Live adapter for the `LlmClient` port using an OpenAI-compatible
//! chat completions API.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ModelSettings;
use crate::error::ModelError;
use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};

/// Live LLM client posting to `{base_url}/chat/completions`.
pub struct LiveLlmClient {
    client: Client,
    endpoint: String,
    api_key: String,
    referer: Option<String>,
    title: Option<String>,
    timeout: Duration,
}

impl LiveLlmClient {
    /// Creates a client for `settings` authenticating with `api_key`.
    pub fn new(settings: &ModelSettings, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!(
                "{}/chat/completions",
                settings.base_url.trim_end_matches('/')
            ),
            api_key: api_key.into(),
            referer: settings.referer.clone(),
            title: settings.title.clone(),
            timeout: settings.timeout(),
        }
    }

    /// Creates a client reading the key from the variable named by
    /// `settings.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty.
    pub fn from_env(settings: &ModelSettings) -> Result<Self, String> {
        let key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| format!("{} environment variable not set", settings.api_key_env))?;
        Ok(Self::new(settings, key))
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ModelError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(request);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        let response = builder.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.classify(&e))?;

        if !status.is_success() {
            return Err(ModelError::request(status.as_u16(), &body));
        }
        parse_completion(&body)
    }

    fn classify(&self, error: &reqwest::Error) -> ModelError {
        if error.is_timeout() {
            ModelError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            ModelError::Transport {
                message: error.to_string(),
            }
        }
    }
}

impl LlmClient for LiveLlmClient {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        let request = request.clone();
        Box::pin(async move { self.send(&request).await })
    }
}

/// Token usage block of a chat completion response.
#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Validates a chat completion body and extracts the first choice.
///
/// # Errors
///
/// Returns [`ModelError::ResponseFormat`] unless the body is JSON with a
/// non-empty `choices` array whose first entry has a string
/// `message.content`.
pub fn parse_completion(body: &str) -> Result<CompletionResponse, ModelError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ModelError::format(format!("response is not JSON: {e}")))?;

    let choices = value
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::format("response has no `choices` array"))?;
    let first = choices
        .first()
        .ok_or_else(|| ModelError::format("`choices` is empty"))?;
    let text = first
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::format("`choices[0].message.content` is not a string"))?;

    let usage: Usage = value
        .get("usage")
        .cloned()
        .and_then(|u| serde_json::from_value(u).ok())
        .unwrap_or_default();

    Ok(CompletionResponse {
        text: text.to_string(),
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        finish_reason: first
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
