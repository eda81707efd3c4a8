//! Attempt records under `.agentic-tdd/cycles/`.
//!
//! One JSON record per agent attempt, with the raw model response and test log
//! next to it, plus a `summary.json` once the run ends. These are product
//! artifacts and are written regardless of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::{CommitId, PhaseResult, TerminalOutcome};
use crate::io::STATE_DIR;

#[derive(Debug, Clone)]
pub struct AttemptPaths {
    pub dir: PathBuf,
    pub record_path: PathBuf,
    pub response_path: PathBuf,
    pub test_log_path: PathBuf,
}

impl AttemptPaths {
    pub fn new(root: &Path, result: &PhaseResult) -> Self {
        let dir = root
            .join(STATE_DIR)
            .join("cycles")
            .join(result.cycle_index.to_string());
        let stem = format!("{}-{}", result.phase.as_str(), result.attempt_number);
        Self {
            record_path: dir.join(format!("{stem}.json")),
            response_path: dir.join(format!("{stem}.response.md")),
            test_log_path: dir.join(format!("{stem}.test.log")),
            dir,
        }
    }
}

/// Final record of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    #[serde(flatten)]
    pub outcome: &'a TerminalOutcome,
    pub cycles_completed: u32,
    pub attempts: usize,
    pub commits: Vec<&'a CommitId>,
}

/// Writer for the attempt records of one work directory.
#[derive(Debug, Clone)]
pub struct AttemptLog {
    root: PathBuf,
}

impl AttemptLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn write_attempt(&self, result: &PhaseResult, response: Option<&str>) -> Result<AttemptPaths> {
        let paths = AttemptPaths::new(&self.root, result);
        fs::create_dir_all(&paths.dir)
            .with_context(|| format!("create attempt dir {}", paths.dir.display()))?;

        write_json(&paths.record_path, result)?;
        if let Some(response) = response {
            write_text(&paths.response_path, response)?;
        }
        if let Some(test_run) = &result.test_outcome {
            write_text(&paths.test_log_path, &test_run.log)?;
        }
        Ok(paths)
    }

    pub fn write_summary(&self, summary: &RunSummary<'_>) -> Result<PathBuf> {
        let path = self.root.join(STATE_DIR).join("summary.json");
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        write_json(&path, summary)?;
        Ok(path)
    }
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_text(path, &buf)
}
