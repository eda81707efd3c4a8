//! Agentic test-driven development cycle controller.
//!
//! Three model-backed agents take turns on a kata: the Tester writes one failing
//! test, the Implementer makes the suite pass, the Refactorer improves the code
//! without changing behaviour. A deterministic controller owns every transition
//! and commits only after the test suite confirms each phase.
//!
//! - **[`core`]**: Pure, deterministic logic (reply parsing, edit scoping, the
//!   cycle state machine). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution,
//!   the model API). Behind traits so tests can substitute fakes.
//!
//! Orchestration modules ([`controller`], [`setup`]) coordinate the two to
//! implement the CLI commands.

pub mod agents;
pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod kata;
pub mod logging;
pub mod settings;
pub mod setup;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
