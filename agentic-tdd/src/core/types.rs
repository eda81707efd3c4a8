//! Shared deterministic types for the cycle controller.
//!
//! These types define stable contracts between the controller, the agents and
//! the attempt log. They serialize to the JSON written under `.agentic-tdd/`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::edit::ParsedEdit;

/// Stage of the Red-Green-Refactor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Red,
    Green,
    Refactor,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Red => "red",
            Phase::Green => "green",
            Phase::Refactor => "refactor",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    /// Agent responsible for this phase (`None` for terminal phases).
    pub fn role(self) -> Option<Role> {
        match self {
            Phase::Red => Some(Role::Tester),
            Phase::Green => Some(Role::Implementer),
            Phase::Refactor => Some(Role::Refactorer),
            Phase::Done | Phase::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_ascii_uppercase())
    }
}

/// The three agents of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tester,
    Implementer,
    Refactorer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Tester => "tester",
            Role::Implementer => "implementer",
            Role::Refactorer => "refactorer",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            Role::Tester => Phase::Red,
            Role::Implementer => Phase::Green,
            Role::Refactorer => Phase::Refactor,
        }
    }

    /// Sentinel reply that declines the phase instead of proposing edits.
    pub fn decline_sentinel(self) -> Option<&'static str> {
        match self {
            Role::Tester => Some("NO_MORE_TESTS"),
            Role::Implementer => None,
            Role::Refactorer => Some("NO_REFACTOR_NEEDED"),
        }
    }

    /// Abort reason reported when this role runs out of attempts.
    pub fn exhausted_reason(self) -> String {
        format!("{} exhausted", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the project's test suite once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRun {
    pub passed: bool,
    /// Combined stdout/stderr of the test command (possibly truncated).
    pub log: String,
}

/// Identifier of a commit produced by the version control gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a project keeps sources and tests, and how its code is fenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLayout {
    /// Name used to import the project from its tests.
    pub package: String,
    pub source_root: String,
    pub test_root: String,
    /// File extension without the dot.
    pub extension: String,
    /// Info string for markdown code fences.
    pub fence: String,
    /// Source file an unlabelled code block is attributed to.
    pub default_source: String,
}

/// Why an attempt was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The response could not be decomposed into valid file edits.
    Parse,
    /// The test run contradicted the phase postcondition.
    Precondition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

/// Record of a single agent attempt. Appended once, never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    pub phase: Phase,
    pub cycle_index: u32,
    /// 1-based attempt number within the phase.
    pub attempt_number: u32,
    /// Edits the agent proposed (`None` when the reply was unparseable or declined).
    pub agent_output: Option<ParsedEdit>,
    /// Test run that followed the edits (`None` when no tests ran).
    pub test_outcome: Option<TestRun>,
    pub rejection: Option<Rejection>,
    /// The agent declined the phase (`NO_MORE_TESTS`, `NO_REFACTOR_NEEDED`).
    pub declined: bool,
    pub commit: Option<CommitId>,
}

impl PhaseResult {
    pub fn committed(&self) -> bool {
        self.commit.is_some()
    }

    pub fn accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Context attached to a run that ended in `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbortReason {
    pub message: String,
    pub phase: Phase,
    pub cycle_index: u32,
    pub attempts: u32,
    /// True when the phase ran out of attempts; false for a collaborator failure.
    pub exhausted: bool,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (phase {}, cycle {}, attempts {})",
            self.message, self.phase, self.cycle_index, self.attempts
        )
    }
}

/// How a controller run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum TerminalOutcome {
    /// `max_cycles` full cycles were committed.
    Completed,
    /// The Tester reported that the kata rules are fully covered.
    Exhausted,
    Aborted(AbortReason),
}

impl TerminalOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TerminalOutcome::Aborted(_))
    }
}
