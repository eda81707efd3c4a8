//! Cycle state machine.
//!
//! Pure transitions only: the controller decides *what* happened in an attempt,
//! this module decides where the cycle goes next.

use serde::Serialize;

use crate::core::types::{Phase, PhaseResult};

/// What happens after a rejected attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the same phase again with feedback.
    Retry,
    /// The phase used up its attempts; the state is now `FAILED`.
    Exhausted,
}

/// Mutable progress of one controller run. Created at `RED` of cycle 0.
#[derive(Debug, Clone, Serialize)]
pub struct CycleState {
    pub cycle_index: u32,
    pub phase: Phase,
    /// Rejected attempts in the current phase.
    pub attempts_in_phase: u32,
    max_attempts: u32,
    history: Vec<PhaseResult>,
}

impl CycleState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            cycle_index: 0,
            phase: Phase::Red,
            attempts_in_phase: 0,
            max_attempts,
            history: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 1-based number of the attempt about to run.
    pub fn attempt_number(&self) -> u32 {
        self.attempts_in_phase + 1
    }

    pub fn history(&self) -> &[PhaseResult] {
        &self.history
    }

    /// Append an attempt record. History is append-only.
    pub fn record(&mut self, result: PhaseResult) {
        self.history.push(result);
    }

    /// Count a rejected attempt; transitions to `FAILED` once the budget is spent.
    pub fn reject(&mut self) -> RetryDecision {
        debug_assert!(!self.phase.is_terminal(), "reject in terminal phase");
        self.attempts_in_phase += 1;
        if self.attempts_in_phase >= self.max_attempts {
            self.phase = Phase::Failed;
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry
        }
    }

    /// Move past an accepted phase.
    ///
    /// `RED → GREEN → REFACTOR`, then the cycle index increments and the state
    /// becomes `DONE` once `max_cycles` cycles are complete, `RED` otherwise.
    pub fn advance(&mut self, max_cycles: u32) {
        self.attempts_in_phase = 0;
        self.phase = match self.phase {
            Phase::Red => Phase::Green,
            Phase::Green => Phase::Refactor,
            Phase::Refactor => {
                self.cycle_index += 1;
                if self.cycle_index >= max_cycles {
                    Phase::Done
                } else {
                    Phase::Red
                }
            }
            terminal @ (Phase::Done | Phase::Failed) => terminal,
        };
    }

    /// Stop without a further transition (collaborator failure).
    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Stop successfully before `max_cycles` (the Tester declined).
    pub fn finish(&mut self) {
        self.attempts_in_phase = 0;
        self.phase = Phase::Done;
    }

    /// Commits produced so far, in order.
    pub fn commits(&self) -> impl Iterator<Item = &PhaseResult> {
        self.history.iter().filter(|result| result.committed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_walks_red_green_refactor() {
        let mut state = CycleState::new(3);
        assert_eq!(state.phase, Phase::Red);
        state.advance(2);
        assert_eq!(state.phase, Phase::Green);
        state.advance(2);
        assert_eq!(state.phase, Phase::Refactor);
        state.advance(2);
        assert_eq!(state.phase, Phase::Red);
        assert_eq!(state.cycle_index, 1);
    }

    #[test]
    fn last_refactor_completes_the_run() {
        let mut state = CycleState::new(3);
        for _ in 0..3 {
            state.advance(1);
        }
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(state.cycle_index, 1);
        state.advance(1);
        assert_eq!(state.phase, Phase::Done);
    }

    #[test]
    fn rejections_count_up_to_the_budget() {
        let mut state = CycleState::new(3);
        state.advance(1);
        assert_eq!(state.attempt_number(), 1);
        assert_eq!(state.reject(), RetryDecision::Retry);
        assert_eq!(state.attempt_number(), 2);
        assert_eq!(state.reject(), RetryDecision::Retry);
        assert_eq!(state.reject(), RetryDecision::Exhausted);
        assert_eq!(state.phase, Phase::Failed);
        assert_eq!(state.attempts_in_phase, 3);
    }

    #[test]
    fn transition_resets_attempts() {
        let mut state = CycleState::new(5);
        state.reject();
        state.reject();
        assert_eq!(state.attempts_in_phase, 2);
        state.advance(1);
        assert_eq!(state.attempts_in_phase, 0);
        assert_eq!(state.phase, Phase::Green);
    }

    #[test]
    fn single_attempt_budget_fails_on_first_rejection() {
        let mut state = CycleState::new(1);
        assert_eq!(state.reject(), RetryDecision::Exhausted);
        assert!(state.phase.is_terminal());
    }
}
