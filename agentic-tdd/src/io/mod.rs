//! Side-effecting collaborators of the cycle controller.

pub mod attempt_log;
pub mod config;
pub mod git;
pub mod llm;
pub mod process;
pub mod project;
pub mod prompt;
pub mod workspace;

/// Tool-owned directory inside the work directory. Never staged.
pub const STATE_DIR: &str = ".agentic-tdd";
