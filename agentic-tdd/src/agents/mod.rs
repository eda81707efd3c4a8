//! The Tester, Implementer and Refactorer agents.
//!
//! Agents are stateless: each call renders a role prompt, asks the model once
//! and validates the reply. Applying edits, running tests and deciding what a
//! reply means for the cycle is the controller's job.

use thiserror::Error;

use crate::core::edit::{EditError, FileEdit};
use crate::core::parse::Proposal;
use crate::core::snapshot::TreeSnapshot;
use crate::io::llm::LlmError;

mod role_agent;

pub use role_agent::RoleAgent;

/// What an agent sees for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub rules: &'a str,
    pub tree: &'a TreeSnapshot,
    /// Why the previous attempt in this phase was rejected.
    pub feedback: Option<&'a str>,
    /// Test staged in RED (Implementer only).
    pub failing_test: Option<&'a FileEdit>,
    /// Output of the last failing test run (Implementer only).
    pub test_log: Option<&'a str>,
}

/// A validated reply together with the raw model text.
#[derive(Debug, Clone)]
pub struct Reply {
    pub proposal: Proposal,
    pub response: String,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("build prompt: {0:#}")]
    Prompt(anyhow::Error),

    /// The reply did not decompose into acceptable edits. Retried by the controller.
    #[error("{source}")]
    Parse {
        source: EditError,
        response: String,
    },
}
