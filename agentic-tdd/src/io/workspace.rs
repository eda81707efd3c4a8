//! The kata work directory as seen by the agents.
//!
//! Reads snapshots of source and test files, writes proposed edits and puts back
//! the previous contents when an attempt is rejected.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::core::edit::ParsedEdit;
use crate::core::path::has_extension;
use crate::core::snapshot::TreeSnapshot;
use crate::core::types::SourceLayout;

/// One file touched by [`Workspace::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFile {
    pub path: String,
    /// Contents before the edit; `None` if the file was created.
    pub prior: Option<String>,
    /// False when the edit matched the existing contents exactly.
    pub changed: bool,
}

/// Undo record for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedEdits {
    files: Vec<AppliedFile>,
}

impl AppliedEdits {
    /// Paths whose contents actually changed.
    pub fn changed_paths(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|file| file.changed)
            .map(|file| file.path.clone())
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.files.iter().all(|file| !file.changed)
    }
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every source and test file with the layout's extension.
    #[instrument(skip_all)]
    pub fn snapshot(&self, layout: &SourceLayout) -> Result<TreeSnapshot> {
        let mut snapshot = TreeSnapshot::new();
        for dir in [&layout.source_root, &layout.test_root] {
            let base = self.root.join(dir);
            if !base.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&base).sort_by_file_name() {
                let entry = entry.with_context(|| format!("walk {}", base.display()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = relative_slash_path(&self.root, entry.path())?;
                if !has_extension(&relative, &layout.extension) {
                    continue;
                }
                let contents = fs::read_to_string(entry.path())
                    .with_context(|| format!("read {}", entry.path().display()))?;
                snapshot.insert(relative, contents);
            }
        }
        debug!(files = snapshot.len(), "snapshot taken");
        Ok(snapshot)
    }

    /// Write every edit, remembering what was there before.
    ///
    /// On a write failure the edits already applied are rolled back before the
    /// error is returned.
    #[instrument(skip_all, fields(files = edit.len()))]
    pub fn apply(&self, edit: &ParsedEdit) -> Result<AppliedEdits> {
        let mut applied = AppliedEdits::default();
        for file_edit in edit.edits() {
            let target = self.root.join(&file_edit.path);
            let prior = read_optional(&target)?;
            let changed = prior.as_deref() != Some(file_edit.content.as_str());
            if changed && let Err(err) = write_file(&target, &file_edit.content) {
                self.restore(&applied)
                    .context("roll back partially applied edits")?;
                return Err(err);
            }
            applied.files.push(AppliedFile {
                path: file_edit.path.clone(),
                prior,
                changed,
            });
        }
        debug!(changed = ?applied.changed_paths(), "edits applied");
        Ok(applied)
    }

    /// Put back the contents recorded by `apply`; created files are removed.
    #[instrument(skip_all)]
    pub fn restore(&self, applied: &AppliedEdits) -> Result<()> {
        for file in applied.files.iter().rev().filter(|file| file.changed) {
            let target = self.root.join(&file.path);
            match &file.prior {
                Some(contents) => write_file(&target, contents)?,
                None => {
                    if target.exists() {
                        fs::remove_file(&target)
                            .with_context(|| format!("remove {}", target.display()))?;
                    }
                }
            }
        }
        debug!(files = applied.files.len(), "edits restored");
        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("read {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn relative_slash_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
    Ok(relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rust_layout;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        (temp, workspace)
    }

    #[test]
    fn snapshot_reads_sources_and_tests_with_extension() {
        let (temp, workspace) = workspace();
        let root = temp.path();
        fs::create_dir_all(root.join("src/nested")).expect("mkdir");
        fs::create_dir_all(root.join("tests")).expect("mkdir");
        fs::write(root.join("src/lib.rs"), "pub mod nested;\n").expect("write");
        fs::write(root.join("src/nested/mod.rs"), "pub fn f() {}\n").expect("write");
        fs::write(root.join("tests/test_f.rs"), "#[test] fn f() {}\n").expect("write");
        fs::write(root.join("src/notes.txt"), "ignored").expect("write");
        fs::write(root.join("Cargo.toml"), "[package]").expect("write");

        let snapshot = workspace.snapshot(&rust_layout("kata")).expect("snapshot");
        let paths: Vec<&str> = snapshot.paths().collect();
        assert_eq!(
            paths,
            vec!["src/lib.rs", "src/nested/mod.rs", "tests/test_f.rs"]
        );
    }

    #[test]
    fn apply_then_restore_returns_to_previous_tree() {
        let (temp, workspace) = workspace();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("src/lib.rs"), "old\n").expect("write");

        let edit = ParsedEdit::from_blocks([("src/lib.rs", "new"), ("src/extra.rs", "extra")])
            .expect("edit");
        let applied = workspace.apply(&edit).expect("apply");
        assert_eq!(applied.changed_paths(), vec!["src/lib.rs", "src/extra.rs"]);
        assert_eq!(fs::read_to_string(root.join("src/lib.rs")).expect("read"), "new\n");

        workspace.restore(&applied).expect("restore");
        assert_eq!(fs::read_to_string(root.join("src/lib.rs")).expect("read"), "old\n");
        assert!(!root.join("src/extra.rs").exists());
    }

    #[test]
    fn identical_content_is_a_noop() {
        let (temp, workspace) = workspace();
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/lib.rs"), "same\n").expect("write");

        let edit = ParsedEdit::from_blocks([("src/lib.rs", "same")]).expect("edit");
        let applied = workspace.apply(&edit).expect("apply");
        assert!(applied.is_noop());
        assert!(applied.changed_paths().is_empty());
    }
}
