//! Cargo-based runner for Rust katas.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use super::{ProjectRunner, RunnerOptions};
use crate::core::types::{SourceLayout, TestRun};
use crate::io::process::run_command_with_timeout;

const GITIGNORE: &str = "/target\n";

/// Library crate with integration tests under `tests/`.
#[derive(Debug)]
pub struct RustRunner {
    work_dir: PathBuf,
    options: RunnerOptions,
    layout: SourceLayout,
}

impl RustRunner {
    pub fn new(work_dir: &Path, options: RunnerOptions) -> Self {
        let package = read_package_name(&work_dir.join("Cargo.toml"))
            .ok()
            .flatten()
            .unwrap_or_else(|| crate_name_for(work_dir));
        Self {
            work_dir: work_dir.to_path_buf(),
            options,
            layout: rust_layout(package),
        }
    }

    fn cargo(&self) -> Command {
        let mut cmd = Command::new("cargo");
        cmd.current_dir(&self.work_dir)
            .env("CARGO_TERM_COLOR", "never");
        cmd
    }
}

impl ProjectRunner for RustRunner {
    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    #[instrument(skip_all, fields(work_dir = %self.work_dir.display()))]
    fn initialize(&mut self) -> Result<()> {
        let manifest = self.work_dir.join("Cargo.toml");
        if manifest.exists() {
            debug!("Cargo.toml present, skipping cargo init");
        } else {
            info!(package = %self.layout.package, "initializing Rust library project");
            let mut cmd = self.cargo();
            cmd.args(["init", "--lib", "--vcs", "none", "--name"])
                .arg(&self.layout.package);
            let output = run_command_with_timeout(
                cmd,
                self.options.test_timeout,
                self.options.output_limit_bytes,
            )
            .context("run cargo init")?;
            if !output.success() {
                bail!("cargo init failed:\n{}", output.combined_log("cargo init"));
            }
        }

        if let Some(package) = read_package_name(&manifest)? {
            self.layout.package = package;
        }

        let gitignore = self.work_dir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, GITIGNORE)
                .with_context(|| format!("write {}", gitignore.display()))?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn run_tests(&mut self) -> Result<TestRun> {
        let mut cmd = self.cargo();
        cmd.args(["test", "--no-fail-fast"]);
        let output = run_command_with_timeout(
            cmd,
            self.options.test_timeout,
            self.options.output_limit_bytes,
        )
        .context("run cargo test")?;
        let passed = output.success();
        debug!(passed, timed_out = output.timed_out, "cargo test finished");
        Ok(TestRun {
            passed,
            log: output.combined_log("cargo test"),
        })
    }
}

/// Layout of a Cargo library: `src/` sources, `tests/` integration tests.
pub fn rust_layout(package: impl Into<String>) -> SourceLayout {
    SourceLayout {
        package: package.into(),
        source_root: "src".to_string(),
        test_root: "tests".to_string(),
        extension: "rs".to_string(),
        fence: "rust".to_string(),
        default_source: "src/lib.rs".to_string(),
    }
}

/// Crate import name declared in an existing manifest.
fn read_package_name(manifest: &Path) -> Result<Option<String>> {
    if !manifest.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(manifest).with_context(|| format!("read {}", manifest.display()))?;
    let table: toml::Table =
        toml::from_str(&raw).with_context(|| format!("parse {}", manifest.display()))?;
    Ok(table
        .get("package")
        .and_then(|package| package.get("name"))
        .and_then(|name| name.as_str())
        .map(|name| name.replace('-', "_")))
}

/// Derive a valid crate name from the work directory name.
fn crate_name_for(work_dir: &Path) -> String {
    let raw = work_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim_matches('_');
    match trimmed.chars().next() {
        None => "kata".to_string(),
        Some(first) if first.is_ascii_digit() => format!("kata_{trimmed}"),
        Some(_) => trimmed.to_string(),
    }
}
