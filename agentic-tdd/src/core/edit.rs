//! File edits proposed by agents and the rules each role must respect.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::path::{has_extension, is_under, normalize_relative};
use crate::core::snapshot::TreeSnapshot;
use crate::core::types::{Role, SourceLayout};

/// Full replacement contents for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

/// A non-empty set of edits with unique, normalized paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParsedEdit {
    edits: Vec<FileEdit>,
}

/// Reasons a model response does not decompose into acceptable edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("response contains no file blocks (expected `### <path>` followed by a fenced code block)")]
    NoEdits,

    #[error("file block for {path} is empty")]
    EmptyContent { path: String },

    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path {path} appears more than once")]
    DuplicatePath { path: String },

    #[error("expected exactly one new test file, got {count} file blocks")]
    TooManyEdits { count: usize },

    #[error("{path} is not a test file under {test_root}/")]
    NotATestFile { path: String, test_root: String },

    #[error("{path} already exists; the new test must go into a new file")]
    TestExists { path: String },

    #[error("{path} is a test file; tests may not be modified in this phase")]
    TouchesTests { path: String },

    #[error("{path} is outside the source directory {source_root}/")]
    OutsideSource { path: String, source_root: String },
}

impl ParsedEdit {
    /// Build from raw `(path, content)` pairs, normalizing paths and trimming content.
    pub fn from_blocks<I, P, C>(blocks: I) -> Result<Self, EditError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let mut edits = Vec::new();
        let mut seen = BTreeSet::new();
        for (raw_path, raw_content) in blocks {
            let raw_path = raw_path.as_ref();
            let path = normalize_relative(raw_path).map_err(|reason| EditError::InvalidPath {
                path: raw_path.trim().to_string(),
                reason,
            })?;
            let trimmed = raw_content.as_ref().trim();
            if trimmed.is_empty() {
                return Err(EditError::EmptyContent { path });
            }
            if !seen.insert(path.clone()) {
                return Err(EditError::DuplicatePath { path });
            }
            let mut content = trimmed.to_string();
            content.push('\n');
            edits.push(FileEdit { path, content });
        }
        if edits.is_empty() {
            return Err(EditError::NoEdits);
        }
        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[FileEdit] {
        &self.edits
    }

    pub fn paths(&self) -> Vec<String> {
        self.edits.iter().map(|edit| edit.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Check that the edit stays within what `role` is allowed to touch.
    ///
    /// - Tester: exactly one new file under the test root with the layout's extension.
    /// - Implementer/Refactorer: files under the source root, never under the test root.
    pub fn check_scope(
        &self,
        role: Role,
        layout: &SourceLayout,
        existing: &TreeSnapshot,
    ) -> Result<(), EditError> {
        match role {
            Role::Tester => {
                if self.edits.len() != 1 {
                    return Err(EditError::TooManyEdits {
                        count: self.edits.len(),
                    });
                }
                let path = &self.edits[0].path;
                if !is_under(path, &layout.test_root) || !has_extension(path, &layout.extension) {
                    return Err(EditError::NotATestFile {
                        path: path.clone(),
                        test_root: layout.test_root.clone(),
                    });
                }
                if existing.contains(path) {
                    return Err(EditError::TestExists { path: path.clone() });
                }
                Ok(())
            }
            Role::Implementer | Role::Refactorer => {
                for edit in &self.edits {
                    if is_under(&edit.path, &layout.test_root) {
                        return Err(EditError::TouchesTests {
                            path: edit.path.clone(),
                        });
                    }
                    if !is_under(&edit.path, &layout.source_root) {
                        return Err(EditError::OutsideSource {
                            path: edit.path.clone(),
                            source_root: layout.source_root.clone(),
                        });
                    }
                }
                Ok(())
            }
        }
    }
}
