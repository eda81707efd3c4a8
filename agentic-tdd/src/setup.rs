//! Preparing a kata work directory.
//!
//! Creates the directory, the project skeleton and the git repository, keeps the
//! `.agentic-tdd/` state directory out of version control and commits the
//! skeleton so every later commit is a TDD step.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::types::CommitId;
use crate::io::STATE_DIR;
use crate::io::git::Git;
use crate::io::project::ProjectRunner;

const SKELETON_COMMIT: &str = "chore: initialize kata project";

/// Outcome of [`prepare_work_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupOutcome {
    /// Commit created for the skeleton; `None` if the repository already had history.
    pub skeleton_commit: Option<CommitId>,
}

/// Make `work_dir` ready for a run. Idempotent.
#[instrument(skip_all, fields(work_dir = %work_dir.display()))]
pub fn prepare_work_dir<P: ProjectRunner>(work_dir: &Path, runner: &mut P) -> Result<SetupOutcome> {
    fs::create_dir_all(work_dir)
        .with_context(|| format!("create work directory {}", work_dir.display()))?;

    runner.initialize().context("initialize project skeleton")?;

    let git = Git::new(work_dir);
    git.init().context("initialize git repository")?;
    ensure_state_gitignore(&work_dir.join(STATE_DIR).join(".gitignore"))?;

    if git.head().is_ok() {
        debug!("repository already has history");
        return Ok(SetupOutcome {
            skeleton_commit: None,
        });
    }

    git.add_all()?;
    let commit = git.commit_staged(SKELETON_COMMIT)?;
    info!(commit = %commit, "kata project initialized");
    Ok(SetupOutcome {
        skeleton_commit: Some(commit),
    })
}

/// Ignore everything under the state directory, including the ignore file itself.
fn ensure_state_gitignore(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .with_context(|| format!("gitignore path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    fs::write(path, "*\n").with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedProjectRunner;

    #[test]
    fn prepare_creates_repo_and_skeleton_commit_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work_dir = temp.path().join("kata");
        let mut runner = ScriptedProjectRunner::new([]);
        fs::create_dir_all(work_dir.join("src")).expect("mkdir");
        fs::write(work_dir.join("src/lib.rs"), "").expect("write");

        let first = prepare_work_dir(&work_dir, &mut runner).expect("prepare");
        assert!(runner.initialized());
        assert!(first.skeleton_commit.is_some());

        let git = Git::new(&work_dir);
        assert_eq!(git.log_subjects().expect("log"), vec![SKELETON_COMMIT]);
        assert!(work_dir.join(STATE_DIR).join(".gitignore").exists());

        let second = prepare_work_dir(&work_dir, &mut runner).expect("prepare again");
        assert_eq!(second.skeleton_commit, None);
        assert_eq!(git.log_subjects().expect("log").len(), 1);
    }

    #[test]
    fn state_directory_is_not_committed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut runner = ScriptedProjectRunner::new([]);
        fs::create_dir_all(temp.path().join(STATE_DIR)).expect("mkdir");
        fs::write(temp.path().join(STATE_DIR).join("config.toml"), "").expect("write");
        fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"k\"\n").expect("write");

        prepare_work_dir(temp.path(), &mut runner).expect("prepare");

        let tracked = std::process::Command::new("git")
            .args(["ls-files"])
            .current_dir(temp.path())
            .output()
            .expect("git ls-files");
        let tracked = String::from_utf8_lossy(&tracked.stdout);
        assert!(tracked.contains("Cargo.toml"));
        assert!(!tracked.contains(STATE_DIR), "{tracked}");
    }
}
