//! Test-only fakes and fixtures.
//!
//! The scripted collaborators replay queued answers in order and panic when a
//! test asks for more than it scripted, so over-calling shows up as a failure.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::TempDir;

pub use crate::io::project::rust_layout;

use crate::core::types::{CommitId, SourceLayout, TestRun};
use crate::io::git::{Git, VersionControl};
use crate::io::llm::{ChatPrompt, LlmClient, LlmError};
use crate::io::project::ProjectRunner;

/// A model that answers from a script and remembers every prompt it saw.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    replies: RefCell<VecDeque<Result<String, LlmError>>>,
    prompts: RefCell<Vec<ChatPrompt>>,
}

impl ScriptedLlm {
    pub fn new(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<ChatPrompt> {
        self.prompts.borrow().clone()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, prompt: &ChatPrompt) -> Result<String, LlmError> {
        self.prompts.borrow_mut().push(prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted model call #{}", self.calls()))
    }
}

/// A project runner that reports scripted test outcomes without running anything.
#[derive(Debug)]
pub struct ScriptedProjectRunner {
    layout: SourceLayout,
    results: VecDeque<Result<TestRun>>,
    runs: usize,
    initialized: bool,
}

impl ScriptedProjectRunner {
    pub fn new(results: impl IntoIterator<Item = TestRun>) -> Self {
        Self::from_results(results.into_iter().map(Ok))
    }

    /// Script runs that may fail to execute at all.
    pub fn from_results(results: impl IntoIterator<Item = Result<TestRun>>) -> Self {
        Self {
            layout: rust_layout("kata"),
            results: results.into_iter().collect(),
            runs: 0,
            initialized: false,
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }
}

impl ProjectRunner for ScriptedProjectRunner {
    fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    fn initialize(&mut self) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    fn run_tests(&mut self) -> Result<TestRun> {
        self.runs += 1;
        self.results
            .pop_front()
            .unwrap_or_else(|| panic!("unscripted test run #{}", self.runs))
    }
}

/// Version control that records staging and commits in memory.
#[derive(Debug, Default)]
pub struct RecordingVcs {
    staged: Vec<String>,
    commits: Vec<(String, Vec<String>)>,
    fail_commits: bool,
}

impl RecordingVcs {
    /// Every `commit` call fails, as a broken repository would.
    pub fn failing_commits() -> Self {
        Self {
            fail_commits: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.commits
            .iter()
            .map(|(message, _)| message.clone())
            .collect()
    }

    /// Paths that went into commit `index` (0-based).
    pub fn staged_before_commit(&self, index: usize) -> Vec<String> {
        self.commits[index].1.clone()
    }
}

impl VersionControl for RecordingVcs {
    fn stage(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            if !self.staged.contains(path) {
                self.staged.push(path.clone());
            }
        }
        Ok(())
    }

    fn commit(&mut self, message: &str) -> Result<CommitId> {
        anyhow::ensure!(!self.fail_commits, "git commit failed: index.lock exists");
        anyhow::ensure!(!self.staged.is_empty(), "nothing staged to commit");
        let paths = std::mem::take(&mut self.staged);
        self.commits.push((message.to_string(), paths));
        Ok(CommitId(format!("c{}", self.commits.len())))
    }
}

/// A temporary git repository with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        let git = Git::new(dir.path());
        git.init()?;
        fs::write(dir.path().join("README.md"), "kata\n")?;
        git.add_all()?;
        git.commit_staged("chore: initial commit")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub fn passing_run() -> TestRun {
    TestRun {
        passed: true,
        log: "test result: ok. 1 passed; 0 failed".to_string(),
    }
}

pub fn failing_run(log: &str) -> TestRun {
    TestRun {
        passed: false,
        log: log.to_string(),
    }
}

/// A model reply holding one labelled Rust block.
pub fn test_block(path: &str, content: &str) -> String {
    format!("### {path}\n```rust\n{content}\n```\n")
}

/// Same shape as [`test_block`]; named for readability at call sites.
pub fn source_block(path: &str, content: &str) -> String {
    test_block(path, content)
}
