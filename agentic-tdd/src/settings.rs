//! Immutable run settings assembled once at startup.
//!
//! Sources, lowest precedence first: built-in defaults, the TOML config file,
//! environment variables (API keys only), command-line flags.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::io::config::TddConfig;
use crate::io::project::Language;

/// Provider-independent fallback variable for the API key.
pub const GENERIC_API_KEY_VAR: &str = "AGENTIC_TDD_API_KEY";

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// OpenAI-compatible model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Perplexity,
    Deepseek,
    Iflow,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Perplexity => "perplexity",
            Provider::Deepseek => "deepseek",
            Provider::Iflow => "iflow",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::Openai => "https://api.openai.com/v1",
            Provider::Perplexity => "https://api.perplexity.ai",
            Provider::Deepseek => "https://api.deepseek.com/v1",
            Provider::Iflow => "https://apis.iflow.cn/v1",
        }
    }

    /// Provider-specific key variable, e.g. `DEEPSEEK_API_KEY`.
    pub fn api_key_var(self) -> String {
        format!("{}_API_KEY", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the LLM client needs. The key never appears in `Debug` output.
#[derive(Clone)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Command-line input for a run, before defaults and the config file apply.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub kata_path: PathBuf,
    pub work_dir: PathBuf,
    pub language: Language,
    pub provider: Provider,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_cycles: Option<u32>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub kata_path: PathBuf,
    pub work_dir: PathBuf,
    pub language: Language,
    pub max_cycles: u32,
    pub max_attempts: u32,
    pub test_timeout: Duration,
    pub output_limit_bytes: usize,
    pub prompt_budget_bytes: usize,
    pub llm: LlmSettings,
}

impl Settings {
    /// Merge the request over the config file; `env` looks up environment variables.
    pub fn resolve(
        request: RunRequest,
        config: &TddConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let max_cycles = request.max_cycles.unwrap_or(config.max_cycles);
        let max_attempts = request.max_attempts.unwrap_or(config.max_attempts);
        if max_cycles == 0 {
            bail!("--max-cycles must be > 0");
        }
        if max_attempts == 0 {
            bail!("--max-attempts must be > 0");
        }
        if request.model.trim().is_empty() {
            bail!("--model must not be empty");
        }

        let api_key = resolve_api_key(request.provider, request.api_key.as_deref(), env)?;
        let base_url = request
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| request.provider.base_url().to_string());

        Ok(Self {
            kata_path: request.kata_path,
            work_dir: request.work_dir,
            language: request.language,
            max_cycles,
            max_attempts,
            test_timeout: Duration::from_secs(config.test_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            prompt_budget_bytes: config.prompt_budget_bytes,
            llm: LlmSettings {
                provider: request.provider,
                model: request.model,
                base_url,
                api_key,
                temperature: config.llm.temperature,
                timeout: Duration::from_secs(config.llm.timeout_secs),
                max_retries: config.llm.max_retries,
            },
        })
    }
}

/// Pick the API key: explicit flag, then `<PROVIDER>_API_KEY`, then the generic variable.
pub fn resolve_api_key(
    provider: Provider,
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    if let Some(key) = explicit.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    let provider_var = provider.api_key_var();
    for var in [provider_var.as_str(), GENERIC_API_KEY_VAR] {
        if let Some(key) = env(var).map(|key| key.trim().to_string())
            && !key.is_empty()
        {
            return Ok(key);
        }
    }
    bail!(
        "no API key for provider {provider}: pass --api-key or set {provider_var} or {GENERIC_API_KEY_VAR}"
    )
}
