//! Kata input.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::io::project::Language;

/// The exercise driving a run. Loaded once, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KataSpec {
    pub rules_text: String,
    pub language: Language,
}

impl KataSpec {
    pub fn new(rules_text: impl Into<String>, language: Language) -> Self {
        Self {
            rules_text: rules_text.into(),
            language,
        }
    }

    /// Read the kata rules from a markdown file.
    pub fn load(path: &Path, language: Language) -> Result<Self> {
        let rules_text = fs::read_to_string(path)
            .with_context(|| format!("read kata file {}", path.display()))?;
        if rules_text.trim().is_empty() {
            bail!("kata file {} is empty", path.display());
        }
        Ok(Self::new(rules_text, language))
    }
}
