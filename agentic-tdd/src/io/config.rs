//! Tuning configuration stored under `.agentic-tdd/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::STATE_DIR;

/// Config file read when `--config` is not given.
pub fn default_config_path(work_dir: &Path) -> PathBuf {
    work_dir.join(STATE_DIR).join("config.toml")
}

/// Run configuration (TOML).
///
/// Meant to be edited by humans. Missing fields take the defaults below; values
/// given on the command line win over the file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TddConfig {
    /// Number of full Red-Green-Refactor cycles to run.
    pub max_cycles: u32,

    /// Attempts per phase before the run aborts.
    pub max_attempts: u32,

    /// Wall-clock limit for one test-suite run.
    pub test_timeout_secs: u64,

    /// Truncate test stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Upper bound on the rendered prompt size.
    pub prompt_budget_bytes: usize,

    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// Retries for rate limits, server errors and network failures.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

impl Default for TddConfig {
    fn default() -> Self {
        Self {
            max_cycles: 5,
            max_attempts: 5,
            test_timeout_secs: 120,
            output_limit_bytes: 64_000,
            prompt_budget_bytes: 48_000,
            llm: LlmConfig::default(),
        }
    }
}

impl TddConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.test_timeout_secs == 0 {
            return Err(anyhow!("test_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow!("llm.temperature must be within 0.0..=2.0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TddConfig::default()`.
pub fn load_config(path: &Path) -> Result<TddConfig> {
    if !path.exists() {
        let cfg = TddConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TddConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TddConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
