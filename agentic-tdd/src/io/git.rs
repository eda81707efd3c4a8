//! Git adapter for the kata repository.
//!
//! The controller decides when to stage and commit; this wrapper only runs the
//! corresponding `git` subprocess calls in the work directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument};

use crate::core::types::CommitId;

/// Fallback identity used when the repository has none configured.
const DEFAULT_USER_NAME: &str = "agentic-tdd";
const DEFAULT_USER_EMAIL: &str = "agentic-tdd@localhost";

/// Staging and committing, as seen by the cycle controller.
pub trait VersionControl {
    /// Add the given work-directory-relative paths to the index.
    fn stage(&mut self, paths: &[String]) -> Result<()>;

    /// Commit everything staged and return the new commit id.
    fn commit(&mut self, message: &str) -> Result<CommitId>;
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn is_repository(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    /// Initialize a repository on `main` if none exists, and make sure commits
    /// have an author identity.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn init(&self) -> Result<()> {
        if self.is_repository() {
            debug!("repository already initialized");
        } else {
            self.run_checked(&["init", "-b", "main"])?;
            info!("initialized git repository");
        }
        for (key, fallback) in [
            ("user.name", DEFAULT_USER_NAME),
            ("user.email", DEFAULT_USER_EMAIL),
        ] {
            if !self.run(&["config", key])?.status.success() {
                debug!(key, fallback, "setting local git identity");
                self.run_checked(&["config", key, fallback])?;
            }
        }
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Paths currently staged for commit.
    pub fn staged_paths(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["diff", "--cached", "--name-only"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        Ok(!self.staged_paths()?.is_empty())
    }

    /// Return the full SHA of HEAD.
    pub fn head(&self) -> Result<CommitId> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(CommitId(out.trim().to_string()))
    }

    /// Commit staged changes; refuses to create an empty commit.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<CommitId> {
        if !self.has_staged_changes()? {
            bail!("nothing staged to commit for '{message}'");
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-q", "-m", message])?;
        let id = self.head()?;
        info!(commit = %id, message, "committed");
        Ok(id)
    }

    /// Subject lines of the commits reachable from HEAD, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["log", "--format=%s"])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

impl VersionControl for Git {
    #[instrument(skip_all, fields(count = paths.len()))]
    fn stage(&mut self, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_checked(&args)?;
        debug!(?paths, "staged");
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<CommitId> {
        self.commit_staged(message)
    }
}
