//! Language-specific project runners.
//!
//! A runner owns everything that depends on the target language: how the
//! skeleton is created, how the suite runs and where sources and tests live.

mod rust;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use rust::{RustRunner, rust_layout};

use crate::core::types::{SourceLayout, TestRun};

/// Skeleton creation and test execution for one project.
pub trait ProjectRunner {
    fn layout(&self) -> &SourceLayout;

    /// Create the project skeleton if it does not exist yet. Idempotent.
    fn initialize(&mut self) -> Result<()>;

    /// Run the whole test suite once. `Err` only when the suite could not be run.
    fn run_tests(&mut self) -> Result<TestRun>;
}

/// Limits applied to every test-suite run.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub test_timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            test_timeout: Duration::from_secs(120),
            output_limit_bytes: 64_000,
        }
    }
}

/// Supported kata languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
        }
    }

    /// Build the runner for this language rooted at `work_dir`.
    pub fn runner(self, work_dir: &Path, options: RunnerOptions) -> AnyProjectRunner {
        match self {
            Language::Rust => AnyProjectRunner::Rust(RustRunner::new(work_dir, options)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statically dispatched runner chosen by [`Language::runner`].
#[derive(Debug)]
pub enum AnyProjectRunner {
    Rust(RustRunner),
}

impl ProjectRunner for AnyProjectRunner {
    fn layout(&self) -> &SourceLayout {
        match self {
            AnyProjectRunner::Rust(runner) => runner.layout(),
        }
    }

    fn initialize(&mut self) -> Result<()> {
        match self {
            AnyProjectRunner::Rust(runner) => runner.initialize(),
        }
    }

    fn run_tests(&mut self) -> Result<TestRun> {
        match self {
            AnyProjectRunner::Rust(runner) => runner.run_tests(),
        }
    }
}
