//! Decompose model responses into file edits.
//!
//! Models are asked for `### <path>` headings followed by a fenced code block,
//! but real responses drift: bare path lines, `File: <path>` labels, truncated
//! final fences, or a single unlabelled block. Strategies are tried in order and
//! the first one that yields blocks wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::edit::{EditError, ParsedEdit};
use crate::core::types::{Role, SourceLayout};

/// What an agent proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    Edits(ParsedEdit),
    /// The agent answered with its decline sentinel.
    Declined,
}

static HEADING_CLOSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###[ \t]*([^\n]+?)[ \t]*\n[ \t]*```[\w+-]*[ \t]*\n(.*?)\n[ \t]*```")
        .expect("heading regex")
});

static PATH_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:^|\n)[ \t]*[*`]*([\w./-]+\.\w+)[*`]*:?[ \t]*\n[ \t]*```[\w+-]*[ \t]*\n(.*?)\n[ \t]*```")
        .expect("path line regex")
});

static FILE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?si)file:[ \t]*([^\n]+?)[ \t]*\n[ \t]*```[\w+-]*[ \t]*\n(.*?)\n[ \t]*```")
        .expect("file label regex")
});

static HEADING_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)###[ \t]*([^\n]+?)[ \t]*\n[ \t]*```[\w+-]*[ \t]*\n(.*?)(?:\n[ \t]*```|\z)")
        .expect("open heading regex")
});

static UNLABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[\w+-]*[ \t]*\n(.*?)(?:\n[ \t]*```|\z)").expect("unlabelled regex")
});

/// Parse a model response for `role`.
///
/// The Tester must always name its file; the Implementer and Refactorer may
/// return a single unlabelled block, which is attributed to
/// `layout.default_source`.
pub fn parse_response(
    role: Role,
    layout: &SourceLayout,
    response: &str,
) -> Result<Proposal, EditError> {
    let blocks = labelled_blocks(response);
    if !blocks.is_empty() {
        return ParsedEdit::from_blocks(blocks).map(Proposal::Edits);
    }

    if let Some(sentinel) = role.decline_sentinel()
        && response.to_ascii_uppercase().contains(sentinel)
    {
        return Ok(Proposal::Declined);
    }

    if role != Role::Tester
        && let Some(caps) = UNLABELLED.captures(response)
    {
        let content = caps.get(1).map_or("", |m| m.as_str());
        return ParsedEdit::from_blocks([(layout.default_source.as_str(), content)])
            .map(Proposal::Edits);
    }

    Err(EditError::NoEdits)
}

fn labelled_blocks(response: &str) -> Vec<(String, String)> {
    for strategy in [&*HEADING_CLOSED, &*PATH_LINE, &*FILE_LABEL, &*HEADING_OPEN] {
        let blocks: Vec<(String, String)> = strategy
            .captures_iter(response)
            .filter_map(|caps| {
                let path = clean_path(caps.get(1)?.as_str())?;
                let content = caps.get(2).map_or("", |m| m.as_str()).to_string();
                Some((path, content))
            })
            .collect();
        if !blocks.is_empty() {
            return blocks;
        }
    }
    Vec::new()
}

/// Strip markdown decoration from a heading and keep it only if it names a file.
fn clean_path(raw: &str) -> Option<String> {
    let mut text = raw.trim();
    if text.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("file:")) {
        text = text[5..].trim();
    }
    let token = text
        .trim_matches(|c| matches!(c, '`' | '*' | '"' | '\''))
        .split_whitespace()
        .next()?
        .trim_end_matches(':')
        .trim_matches(|c| matches!(c, '`' | '*'));
    let file_name = token.rsplit('/').next()?;
    if !file_name.contains('.') || file_name == "." {
        return None;
    }
    Some(token.to_string())
}
