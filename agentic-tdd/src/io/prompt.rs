//! Prompt builder for the three agents.
//!
//! Templates are markdown with `<!-- section:KEY required|droppable -->`
//! markers. After rendering, sections are cut apart so the builder can keep the
//! prompt within a byte budget, then reassembled into a system part (contract
//! and kata rules) and a user part (everything else).

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

use crate::core::edit::FileEdit;
use crate::core::snapshot::TreeSnapshot;
use crate::core::types::{Role, SourceLayout};
use crate::io::llm::ChatPrompt;

const TESTER_TEMPLATE: &str = include_str!("prompts/tester.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const REFACTORER_TEMPLATE: &str = include_str!("prompts/refactorer.md");

/// Sections that go into the system message.
const SYSTEM_SECTIONS: [&str; 2] = ["contract", "rules"];

/// Drop order when over budget.
const DROP_ORDER: [&str; 3] = ["test_log", "tree", "feedback"];

const TRUNCATION_MARKER: &str = "\n[truncated]";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section regex")
});

/// Everything an agent prompt is rendered from.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub role: Role,
    pub language: &'a str,
    pub layout: &'a SourceLayout,
    pub rules: &'a str,
    pub tree: &'a TreeSnapshot,
    pub failing_test: Option<&'a FileEdit>,
    pub test_log: Option<&'a str>,
    pub feedback: Option<&'a str>,
}

struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (role, source) in [
            (Role::Tester, TESTER_TEMPLATE),
            (Role::Implementer, IMPLEMENTER_TEMPLATE),
            (Role::Refactorer, REFACTORER_TEMPLATE),
        ] {
            env.add_template(role.as_str(), source)
                .with_context(|| format!("load {role} template"))?;
        }
        Ok(Self { env })
    }

    fn render(&self, input: &PromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template(input.role.as_str())?;
        let layout = input.layout;
        let tree = (!input.tree.is_empty()).then(|| input.tree.render(&layout.fence));
        let rendered = template
            .render(context! {
                language => input.language,
                package => layout.package,
                source_root => layout.source_root,
                test_root => layout.test_root,
                extension => layout.extension,
                fence => layout.fence,
                default_source => layout.default_source,
                sentinel => input.role.decline_sentinel(),
                rules => input.rules.trim(),
                tree => tree,
                failing_test => input.failing_test.map(|test| context! {
                    path => test.path,
                    content => test.content.trim_end(),
                }),
                test_log => non_blank(input.test_log),
                feedback => non_blank(input.feedback),
            })
            .with_context(|| format!("render {} prompt", input.role))?;
        Ok(rendered)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::new();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |next| next.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

fn total_len(sections: &[ParsedSection]) -> usize {
    sections.iter().map(|s| s.content.len()).sum()
}

/// Drop droppable sections in [`DROP_ORDER`], then truncate the largest section.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let total = total_len(sections);
    if total <= budget {
        return;
    }
    let Some(largest) = sections.iter_mut().max_by_key(|s| s.content.len()) else {
        return;
    };
    let before_len = largest.content.len();
    let allowed = before_len.saturating_sub(total - budget);
    truncate_at_char_boundary(&mut largest.content, allowed.saturating_sub(TRUNCATION_MARKER.len()));
    largest.content.push_str(TRUNCATION_MARKER);
    debug!(
        section = largest.key,
        before_len,
        after_len = largest.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn join_sections<'s>(sections: impl Iterator<Item = &'s ParsedSection>) -> String {
    sections
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds agent prompts within a byte budget, dropping less critical sections first.
pub struct PromptBuilder {
    engine: PromptEngine,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        Ok(Self {
            engine: PromptEngine::new()?,
            budget_bytes,
        })
    }

    pub fn build(&self, input: &PromptInputs<'_>) -> Result<ChatPrompt> {
        let rendered = self.engine.render(input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        let is_system = |s: &&ParsedSection| SYSTEM_SECTIONS.contains(&s.key.as_str());
        Ok(ChatPrompt {
            system: join_sections(sections.iter().filter(is_system)),
            user: join_sections(sections.iter().filter(|s| !is_system(s))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::rust_layout;

    fn tree() -> TreeSnapshot {
        let mut tree = TreeSnapshot::new();
        tree.insert("src/lib.rs", "pub fn add(a: i32, b: i32) -> i32 { a + b }\n");
        tree
    }

    fn inputs<'a>(
        role: Role,
        layout: &'a SourceLayout,
        tree: &'a TreeSnapshot,
    ) -> PromptInputs<'a> {
        PromptInputs {
            role,
            language: "rust",
            layout,
            rules: "Add two numbers.",
            tree,
            failing_test: None,
            test_log: None,
            feedback: None,
        }
    }

    #[test]
    fn contract_and_rules_go_to_system_part() {
        let layout = rust_layout("calc");
        let tree = tree();
        let prompt = PromptBuilder::new(10_000)
            .expect("builder")
            .build(&inputs(Role::Tester, &layout, &tree))
            .expect("build");

        assert!(prompt.system.contains("### Tester Contract"));
        assert!(prompt.system.contains("<rules>\nAdd two numbers.\n</rules>"));
        assert!(prompt.system.contains("`calc`"));
        assert!(prompt.system.contains("NO_MORE_TESTS"));
        assert!(prompt.user.contains("### Current Code"));
        assert!(prompt.user.contains("### src/lib.rs"));
        assert!(!prompt.user.contains("### Previous Attempt"));
        assert!(!prompt.user.contains("<!--"));
    }

    #[test]
    fn implementer_sees_failing_test_log_and_feedback_in_order() {
        let layout = rust_layout("calc");
        let tree = tree();
        let failing = FileEdit {
            path: "tests/test_sub.rs".to_string(),
            content: "use calc::sub;\n".to_string(),
        };
        let mut input = inputs(Role::Implementer, &layout, &tree);
        input.failing_test = Some(&failing);
        input.test_log = Some("error[E0432]: unresolved import `calc::sub`");
        input.feedback = Some("tests still fail");

        let prompt = PromptBuilder::new(10_000)
            .expect("builder")
            .build(&input)
            .expect("build");
        let user = &prompt.user;
        let test_pos = user.find("### Failing Test").expect("failing test");
        let log_pos = user.find("### Test Output").expect("test log");
        let tree_pos = user.find("### Current Code").expect("tree");
        let feedback_pos = user.find("### Previous Attempt").expect("feedback");
        let task_pos = user.find("### Task").expect("task");
        assert!(test_pos < log_pos);
        assert!(log_pos < tree_pos);
        assert!(tree_pos < feedback_pos);
        assert!(feedback_pos < task_pos);
        assert!(user.contains("### tests/test_sub.rs\n```rust\nuse calc::sub;\n```"));
    }

    #[test]
    fn refactorer_prompt_mentions_sentinel() {
        let layout = rust_layout("calc");
        let tree = tree();
        let prompt = PromptBuilder::new(10_000)
            .expect("builder")
            .build(&inputs(Role::Refactorer, &layout, &tree))
            .expect("build");
        assert!(prompt.system.contains("NO_REFACTOR_NEEDED"));
        assert!(prompt.user.contains("NO_REFACTOR_NEEDED"));
    }

    #[test]
    fn budget_drops_droppable_sections_first() {
        let layout = rust_layout("calc");
        let mut big_tree = TreeSnapshot::new();
        big_tree.insert("src/lib.rs", "// filler\n".repeat(300));
        let mut input = inputs(Role::Tester, &layout, &big_tree);
        input.feedback = Some("previous test passed already");

        let prompt = PromptBuilder::new(2_000)
            .expect("builder")
            .build(&input)
            .expect("build");
        assert!(!prompt.user.contains("### Current Code"), "tree dropped");
        assert!(prompt.user.contains("### Previous Attempt"), "feedback kept");
        assert!(prompt.system.contains("### Tester Contract"));
        assert!(prompt.user.contains("### Task"));
    }

    #[test]
    fn budget_truncates_required_sections_last() {
        let layout = rust_layout("calc");
        let mut big_tree = TreeSnapshot::new();
        big_tree.insert("src/lib.rs", "é".repeat(5_000));
        let input = inputs(Role::Refactorer, &layout, &big_tree);

        let prompt = PromptBuilder::new(3_000)
            .expect("builder")
            .build(&input)
            .expect("build");
        assert!(prompt.user.contains("### Current Code"));
        assert!(prompt.user.contains("[truncated]"));
        assert!(prompt.len() <= 3_000 + 64, "prompt is {} bytes", prompt.len());
    }
}
