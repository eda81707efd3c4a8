//! In-memory snapshot of the project's source and test files.

use std::collections::BTreeMap;

/// Relative path → file contents, ordered by path for stable prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    files: BTreeMap<String, String>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Render as `### path` headings followed by fenced blocks.
    pub fn render(&self, fence: &str) -> String {
        if self.files.is_empty() {
            return "No code files present yet.".to_string();
        }
        self.files
            .iter()
            .map(|(path, contents)| format!("### {path}\n```{fence}\n{}\n```", contents.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
