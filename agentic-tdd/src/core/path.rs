//! Normalization of agent-proposed file paths.
//!
//! Paths arrive as free text from a model response. Before anything touches the
//! disk they are reduced to a `/`-separated relative path that stays inside the
//! work directory.

use std::path::{Component, Path};

/// Directories an agent may never write into.
const PROTECTED_DIRS: [&str; 3] = [".git", ".agentic-tdd", "target"];

/// Normalize a raw path into a relative, `/`-separated form.
///
/// Rejects absolute paths, `..` components and writes into protected
/// directories. The error string names the violated rule.
pub fn normalize_relative(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("path is empty".to_string());
    }
    if trimmed.contains('\\') {
        return Err("path must use '/' separators".to_string());
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| "path is not valid UTF-8".to_string())?;
                parts.push(part.to_string());
            }
            Component::ParentDir => return Err("path escapes the work directory".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("path must be relative to the work directory".to_string());
            }
        }
    }

    let Some(first) = parts.first() else {
        return Err("path is empty".to_string());
    };
    if PROTECTED_DIRS.contains(&first.as_str()) {
        return Err(format!("path writes into protected directory '{first}'"));
    }
    Ok(parts.join("/"))
}

/// True if a normalized path lives under the `root` directory.
pub fn is_under(path: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    path.strip_prefix(root)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

/// True if a normalized path carries the given extension (without the dot).
pub fn has_extension(path: &str, extension: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_current_dir_prefix() {
        assert_eq!(
            normalize_relative("./tests/test_add.rs").expect("normalize"),
            "tests/test_add.rs"
        );
        assert_eq!(
            normalize_relative("  src//lib.rs ").expect("normalize"),
            "src/lib.rs"
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        let err = normalize_relative("src/../../etc/passwd").unwrap_err();
        assert!(err.contains("escapes"));
    }

    #[test]
    fn rejects_absolute_paths() {
        let err = normalize_relative("/tmp/lib.rs").unwrap_err();
        assert!(err.contains("relative"));
    }

    #[test]
    fn rejects_protected_directories() {
        assert!(normalize_relative(".git/config").is_err());
        assert!(normalize_relative(".agentic-tdd/cycles/0/red-1.json").is_err());
        assert!(normalize_relative("target/debug/build.rs").is_err());
    }

    #[test]
    fn is_under_matches_whole_components() {
        assert!(is_under("tests/test_add.rs", "tests"));
        assert!(is_under("tests/nested/test_add.rs", "tests/"));
        assert!(!is_under("testsuite/a.rs", "tests"));
        assert!(!is_under("tests", "tests"));
        assert!(!is_under("src/tests/a.rs", "tests"));
    }

    #[test]
    fn has_extension_checks_suffix() {
        assert!(has_extension("src/lib.rs", "rs"));
        assert!(!has_extension("src/lib.rs.bak", "rs"));
        assert!(!has_extension("Makefile", "rs"));
    }
}
