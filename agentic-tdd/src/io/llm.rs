//! OpenAI-compatible chat-completions client.
//!
//! Every supported provider speaks the same `/chat/completions` dialect; only
//! the base URL and key differ, and both arrive through [`LlmSettings`].

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::settings::LlmSettings;

/// Initial backoff delay for retries.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound for a server-provided `retry-after`.
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Upper bound for exponential backoff between retries.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Errors from the model provider.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Duration },

    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("malformed provider JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A rendered prompt: role contract in `system`, the task in `user`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn len(&self) -> usize {
        self.system.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.user.is_empty()
    }
}

/// Text generation as seen by the agents.
pub trait LlmClient {
    fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError>;
}

/// Exponential backoff before retry `attempt` (1-based), capped at [`MAX_BACKOFF_MS`].
fn backoff_for(attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(INITIAL_BACKOFF_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Check if an HTTP status code is retryable.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Blocking client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    settings: LlmSettings,
    http: Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { settings, http })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, prompt: &ChatPrompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
        })
    }
}

impl LlmClient for OpenAiCompatClient {
    #[instrument(skip_all, fields(provider = %self.settings.provider, model = %self.settings.model, prompt_bytes = prompt.len()))]
    fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        let url = self.endpoint();
        let body = self.request_body(prompt);
        let max_retries = self.settings.max_retries;

        let mut last_error = None;
        for attempt in 0..=max_retries {
            if attempt > 0 {
                let backoff = match &last_error {
                    Some(LlmError::RateLimited { retry_after }) => *retry_after,
                    _ => backoff_for(attempt),
                };
                warn!(
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after transient error"
                );
                thread::sleep(backoff);
            }

            let response = match self
                .http
                .post(&url)
                .bearer_auth(&self.settings.api_key)
                .json(&body)
                .send()
            {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(1)
                    .min(MAX_RETRY_AFTER_SECS);
                debug!(attempt, retry_after, "rate limited");
                last_error = Some(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
                continue;
            }

            let text = response.text().unwrap_or_default();
            if is_retryable_status(status) {
                debug!(attempt, status, "retryable error");
                last_error = Some(LlmError::Api {
                    status,
                    message: text,
                });
                continue;
            }
            if !(200..300).contains(&status) {
                return Err(LlmError::Api {
                    status,
                    message: text,
                });
            }

            let content = parse_completion(&text)?;
            debug!(response_bytes = content.len(), "completion received");
            return Ok(content);
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::InvalidResponse("max retries exceeded".to_string())))
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Extract the first choice's text from a chat-completions body.
fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: CompletionResponse = serde_json::from_str(body)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| LlmError::InvalidResponse("no message content in choices".to_string()))?;
    if content.trim().is_empty() {
        return Err(LlmError::InvalidResponse(
            "provider returned an empty message".to_string(),
        ));
    }
    Ok(content)
}
