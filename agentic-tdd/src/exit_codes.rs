//! Stable exit codes for the `agentic-tdd` CLI.

use crate::core::types::TerminalOutcome;

/// Run completed all cycles, or the Tester declared the kata covered.
pub const OK: i32 = 0;
/// Invalid input or configuration, a setup failure, or a collaborator failure mid-run.
pub const INVALID: i32 = 1;
/// A phase used up its attempts. Collaborator failures mid-run exit with [`INVALID`].
pub const ABORTED: i32 = 3;

/// Exit code for a finished run.
pub fn for_outcome(outcome: &TerminalOutcome) -> i32 {
    match outcome {
        TerminalOutcome::Completed | TerminalOutcome::Exhausted => OK,
        TerminalOutcome::Aborted(reason) if reason.exhausted => ABORTED,
        TerminalOutcome::Aborted(_) => INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AbortReason, Phase};

    fn aborted(exhausted: bool) -> TerminalOutcome {
        TerminalOutcome::Aborted(AbortReason {
            message: "implementer exhausted".to_string(),
            phase: Phase::Green,
            cycle_index: 0,
            attempts: 3,
            exhausted,
        })
    }

    #[test]
    fn only_exhaustion_maps_to_aborted() {
        assert_eq!(for_outcome(&TerminalOutcome::Completed), OK);
        assert_eq!(for_outcome(&TerminalOutcome::Exhausted), OK);
        assert_eq!(for_outcome(&aborted(true)), ABORTED);
        assert_eq!(for_outcome(&aborted(false)), INVALID);
    }
}
