//! The Red-Green-Refactor cycle controller.
//!
//! The controller is the only authority on phase transitions and commit timing.
//! Agents propose edits; the controller applies them, runs the suite, checks the
//! phase postcondition and either stages/commits or restores the edits and
//! retries with feedback.
//!
//! | phase    | agent       | suite must | on success                 |
//! |----------|-------------|------------|----------------------------|
//! | RED      | Tester      | fail       | stage the new test         |
//! | GREEN    | Implementer | pass       | stage sources, `feat:`     |
//! | REFACTOR | Refactorer  | pass       | stage sources, `refactor:` |

use anyhow::Context;
use tracing::{info, instrument, warn};

use crate::agents::{AgentError, PromptContext, RoleAgent};
use crate::core::edit::{FileEdit, ParsedEdit};
use crate::core::parse::Proposal;
use crate::core::state::{CycleState, RetryDecision};
use crate::core::types::{
    AbortReason, CommitId, PhaseResult, Rejection, RejectionKind, Role, SourceLayout,
    TerminalOutcome, TestRun,
};
use crate::io::attempt_log::{AttemptLog, RunSummary};
use crate::io::git::VersionControl;
use crate::io::llm::LlmClient;
use crate::io::project::ProjectRunner;
use crate::io::prompt::PromptBuilder;
use crate::io::workspace::{AppliedEdits, Workspace};
use crate::kata::KataSpec;

/// Bytes of test output quoted back to an agent as feedback.
const FEEDBACK_LOG_TAIL_BYTES: usize = 4_000;

/// Limits for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub max_cycles: u32,
    pub max_attempts: u32,
}

/// Model, project runner and version control used by one run.
pub struct Collaborators<'a, L, P, V> {
    pub llm: &'a L,
    pub runner: &'a mut P,
    pub vcs: &'a mut V,
}

/// How a run ended and what it did on the way.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: TerminalOutcome,
    pub state: CycleState,
}

impl RunReport {
    pub fn commits(&self) -> Vec<CommitId> {
        self.state
            .commits()
            .filter_map(|result| result.commit.clone())
            .collect()
    }

    pub fn history(&self) -> &[PhaseResult] {
        self.state.history()
    }
}

/// Result of a whole phase.
enum PhaseEnd {
    Accepted,
    /// The Tester declined: every kata rule is covered.
    KataExhausted,
}

/// Result of a single attempt.
enum AttemptEnd {
    Accepted,
    KataExhausted,
    /// Rejected with feedback for the next attempt.
    Rejected(String),
}

/// Work carried from RED into GREEN of the same cycle.
#[derive(Debug, Default)]
struct CycleWork {
    failing_test: Option<FileEdit>,
    test_log: Option<String>,
}

pub struct CycleController<'a, L, P, V> {
    kata: &'a KataSpec,
    config: ControllerConfig,
    llm: &'a L,
    runner: &'a mut P,
    vcs: &'a mut V,
    prompts: PromptBuilder,
    layout: SourceLayout,
    workspace: Workspace,
    attempt_log: Option<AttemptLog>,
    cycle: CycleWork,
}

impl<'a, L, P, V> CycleController<'a, L, P, V>
where
    L: LlmClient,
    P: ProjectRunner,
    V: VersionControl,
{
    /// The runner must already be initialized; its layout is fixed for the run.
    pub fn new(
        kata: &'a KataSpec,
        collaborators: Collaborators<'a, L, P, V>,
        workspace: Workspace,
        prompts: PromptBuilder,
        config: ControllerConfig,
    ) -> Self {
        let layout = collaborators.runner.layout().clone();
        Self {
            kata,
            config,
            llm: collaborators.llm,
            runner: collaborators.runner,
            vcs: collaborators.vcs,
            prompts,
            layout,
            workspace,
            attempt_log: None,
            cycle: CycleWork::default(),
        }
    }

    /// Write attempt records and a run summary through `log`.
    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    /// Drive cycles until `max_cycles` complete, the Tester declines, or a phase aborts.
    ///
    /// Never returns an error: collaborator failures end the run as
    /// [`TerminalOutcome::Aborted`] with the phase, cycle and attempt they hit.
    #[instrument(skip_all, fields(max_cycles = self.config.max_cycles, max_attempts = self.config.max_attempts))]
    pub fn run(mut self) -> RunReport {
        let mut state = CycleState::new(self.config.max_attempts);
        info!("starting TDD run");

        let outcome = loop {
            let Some(role) = state.phase.role() else {
                break TerminalOutcome::Completed;
            };
            info!(cycle = state.cycle_index, phase = %state.phase, "phase started");
            match self.run_phase(role, &mut state) {
                Ok(PhaseEnd::Accepted) => state.advance(self.config.max_cycles),
                Ok(PhaseEnd::KataExhausted) => {
                    state.finish();
                    break TerminalOutcome::Exhausted;
                }
                Err(reason) => {
                    state.fail();
                    break TerminalOutcome::Aborted(reason);
                }
            }
        };

        match &outcome {
            TerminalOutcome::Aborted(reason) => warn!(%reason, "run aborted"),
            _ => info!(?outcome, cycles = state.cycle_index, "run finished"),
        }
        let report = RunReport { outcome, state };
        self.write_summary(&report);
        report
    }

    fn run_phase(&mut self, role: Role, state: &mut CycleState) -> Result<PhaseEnd, AbortReason> {
        let mut rejections: Vec<String> = Vec::new();
        loop {
            let feedback = render_feedback(&rejections);
            match self.attempt(role, state, feedback.as_deref())? {
                AttemptEnd::Accepted => return Ok(PhaseEnd::Accepted),
                AttemptEnd::KataExhausted => return Ok(PhaseEnd::KataExhausted),
                AttemptEnd::Rejected(message) => {
                    warn!(
                        %role,
                        cycle = state.cycle_index,
                        attempt = state.attempt_number(),
                        reason = %first_line(&message),
                        "attempt rejected"
                    );
                    match state.reject() {
                        RetryDecision::Retry => rejections.push(message),
                        RetryDecision::Exhausted => {
                            return Err(AbortReason {
                                message: role.exhausted_reason(),
                                phase: role.phase(),
                                cycle_index: state.cycle_index,
                                attempts: state.attempts_in_phase,
                                exhausted: true,
                            });
                        }
                    }
                }
            }
        }
    }

    /// One agent invocation, its edits, one test run and the resulting decision.
    fn attempt(
        &mut self,
        role: Role,
        state: &mut CycleState,
        feedback: Option<&str>,
    ) -> Result<AttemptEnd, AbortReason> {
        let cycle_index = state.cycle_index;
        let attempt_number = state.attempt_number();
        let abort = |message: String| AbortReason {
            message,
            phase: role.phase(),
            cycle_index,
            attempts: attempt_number,
            exhausted: false,
        };

        let tree = self
            .workspace
            .snapshot(&self.layout)
            .map_err(|err| abort(format!("read work tree: {err:#}")))?;
        let is_implementer = role == Role::Implementer;
        let context = PromptContext {
            rules: &self.kata.rules_text,
            tree: &tree,
            feedback,
            failing_test: self.cycle.failing_test.as_ref().filter(|_| is_implementer),
            test_log: self.cycle.test_log.as_deref().filter(|_| is_implementer),
        };
        let agent = RoleAgent::new(
            role,
            self.llm,
            &self.prompts,
            &self.layout,
            self.kata.language.as_str(),
        );

        let mut record = PhaseResult {
            phase: role.phase(),
            cycle_index,
            attempt_number,
            agent_output: None,
            test_outcome: None,
            rejection: None,
            declined: false,
            commit: None,
        };

        let reply = match agent.propose(&context) {
            Ok(reply) => reply,
            Err(AgentError::Parse { source, response }) => {
                let message = format!("Your previous response could not be used: {source}.");
                record.rejection = Some(Rejection {
                    kind: RejectionKind::Parse,
                    message: message.clone(),
                });
                self.record(state, record, Some(&response));
                return Ok(AttemptEnd::Rejected(message));
            }
            Err(err) => return Err(abort(format!("{role} agent failed: {err}"))),
        };

        let edits = match reply.proposal {
            Proposal::Declined => {
                info!(%role, "agent declined");
                record.declined = true;
                self.record(state, record, Some(&reply.response));
                return Ok(match role {
                    Role::Tester => AttemptEnd::KataExhausted,
                    Role::Implementer | Role::Refactorer => AttemptEnd::Accepted,
                });
            }
            Proposal::Edits(edits) => edits,
        };

        let applied = self
            .workspace
            .apply(&edits)
            .map_err(|err| abort(format!("apply edits: {err:#}")))?;
        record.agent_output = Some(edits.clone());

        if role == Role::Refactorer && applied.is_noop() {
            info!("refactoring left every file unchanged, nothing to commit");
            self.record(state, record, Some(&reply.response));
            return Ok(AttemptEnd::Accepted);
        }

        let run = match self.runner.run_tests() {
            Ok(run) => run,
            Err(err) => {
                self.restore_quietly(&applied);
                return Err(abort(format!("run tests: {err:#}")));
            }
        };
        record.test_outcome = Some(run.clone());

        let expected_pass = role != Role::Tester;
        if run.passed != expected_pass {
            self.workspace
                .restore(&applied)
                .map_err(|err| abort(format!("restore rejected edits: {err:#}")))?;
            let message = self.precondition_feedback(role, &run);
            record.rejection = Some(Rejection {
                kind: RejectionKind::Precondition,
                message: message.clone(),
            });
            self.record(state, record, Some(&reply.response));
            return Ok(AttemptEnd::Rejected(message));
        }

        let commit = match self.accept(role, cycle_index, &edits, &applied, run) {
            Ok(commit) => commit,
            Err(err) => {
                self.restore_quietly(&applied);
                return Err(abort(format!("{err:#}")));
            }
        };
        record.commit = commit;
        self.record(state, record, Some(&reply.response));
        Ok(AttemptEnd::Accepted)
    }

    /// Stage (and for GREEN/REFACTOR commit) an attempt whose postcondition held.
    fn accept(
        &mut self,
        role: Role,
        cycle_index: u32,
        edits: &ParsedEdit,
        applied: &AppliedEdits,
        run: TestRun,
    ) -> anyhow::Result<Option<CommitId>> {
        match role {
            Role::Tester => {
                let test = edits
                    .edits()
                    .first()
                    .cloned()
                    .context("tester proposed no test file")?;
                self.vcs.stage(std::slice::from_ref(&test.path))?;
                info!(test = %test.path, "failing test staged");
                self.cycle = CycleWork {
                    failing_test: Some(test),
                    test_log: Some(run.log),
                };
                Ok(None)
            }
            Role::Implementer => {
                self.vcs.stage(&applied.changed_paths())?;
                let subject = self
                    .cycle
                    .failing_test
                    .as_ref()
                    .map_or("new test", |test| test.path.as_str());
                let id = self.vcs.commit(&format!("feat: make {subject} pass"))?;
                info!(commit = %id, cycle = cycle_index, "GREEN committed");
                self.cycle = CycleWork::default();
                Ok(Some(id))
            }
            Role::Refactorer => {
                let paths = applied.changed_paths();
                self.vcs.stage(&paths)?;
                let message = format!(
                    "refactor: tidy {} (cycle {})",
                    paths.join(", "),
                    cycle_index + 1
                );
                let id = self.vcs.commit(&message)?;
                info!(commit = %id, cycle = cycle_index, "REFACTOR committed");
                Ok(Some(id))
            }
        }
    }

    fn precondition_feedback(&mut self, role: Role, run: &TestRun) -> String {
        match role {
            Role::Tester => format!(
                "The test you wrote already passes against the current code, so it does not \
                 drive new behaviour. Write a test for behaviour that is not implemented yet.\n\n\
                 Test output:\n{}",
                log_tail(&run.log)
            ),
            Role::Implementer => {
                self.cycle.test_log = Some(run.log.clone());
                "The tests still fail after your change. The updated test output is included; \
                 fix the implementation."
                    .to_string()
            }
            Role::Refactorer => format!(
                "The tests fail after your refactoring, so behaviour changed. The change was \
                 reverted. Propose a behaviour-preserving refactoring or reply NO_REFACTOR_NEEDED.\n\n\
                 Test output:\n{}",
                log_tail(&run.log)
            ),
        }
    }

    fn restore_quietly(&self, applied: &AppliedEdits) {
        if let Err(err) = self.workspace.restore(applied) {
            warn!(err = %format!("{err:#}"), "failed to restore edits");
        }
    }

    fn record(&self, state: &mut CycleState, result: PhaseResult, response: Option<&str>) {
        if let Some(log) = &self.attempt_log
            && let Err(err) = log.write_attempt(&result, response)
        {
            warn!(err = %format!("{err:#}"), "failed to write attempt record");
        }
        state.record(result);
    }

    fn write_summary(&self, report: &RunReport) {
        let Some(log) = &self.attempt_log else {
            return;
        };
        let commits: Vec<&CommitId> = report
            .state
            .commits()
            .filter_map(|result| result.commit.as_ref())
            .collect();
        let summary = RunSummary {
            outcome: &report.outcome,
            cycles_completed: report.state.cycle_index,
            attempts: report.state.history().len(),
            commits,
        };
        if let Err(err) = log.write_summary(&summary) {
            warn!(err = %format!("{err:#}"), "failed to write run summary");
        }
    }
}

/// Every rejection so far in the phase, numbered by attempt.
fn render_feedback(rejections: &[String]) -> Option<String> {
    if rejections.is_empty() {
        return None;
    }
    Some(
        rejections
            .iter()
            .enumerate()
            .map(|(index, message)| format!("Attempt {} was rejected:\n{message}", index + 1))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Last [`FEEDBACK_LOG_TAIL_BYTES`] of a test log, cut on a char boundary.
fn log_tail(log: &str) -> &str {
    if log.len() <= FEEDBACK_LOG_TAIL_BYTES {
        return log;
    }
    let mut start = log.len() - FEEDBACK_LOG_TAIL_BYTES;
    while !log.is_char_boundary(start) {
        start += 1;
    }
    &log[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Phase;
    use crate::io::llm::LlmError;
    use crate::io::project::Language;
    use crate::test_support::{
        RecordingVcs, ScriptedLlm, ScriptedProjectRunner, failing_run, passing_run, source_block,
        test_block,
    };

    struct Harness {
        _temp: tempfile::TempDir,
        workspace: Workspace,
        kata: KataSpec,
    }

    impl Harness {
        fn new() -> Self {
            let temp = tempfile::tempdir().expect("tempdir");
            std::fs::create_dir_all(temp.path().join("src")).expect("mkdir");
            std::fs::write(temp.path().join("src/lib.rs"), "").expect("write lib");
            Self {
                workspace: Workspace::new(temp.path()),
                _temp: temp,
                kata: KataSpec::new("Add two numbers.", Language::Rust),
            }
        }

        fn run(
            &self,
            llm: &ScriptedLlm,
            runner: &mut ScriptedProjectRunner,
            vcs: &mut RecordingVcs,
            config: ControllerConfig,
        ) -> RunReport {
            CycleController::new(
                &self.kata,
                Collaborators { llm, runner, vcs },
                self.workspace.clone(),
                PromptBuilder::new(20_000).expect("prompts"),
                config,
            )
            .run()
        }

        fn read(&self, path: &str) -> Option<String> {
            std::fs::read_to_string(self.workspace.root().join(path)).ok()
        }
    }

    fn config(max_cycles: u32, max_attempts: u32) -> ControllerConfig {
        ControllerConfig {
            max_cycles,
            max_attempts,
        }
    }

    #[test]
    fn one_clean_cycle_makes_feat_then_refactor_commit() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok(source_block("src/lib.rs", "pub fn add() -> () {}")),
        ]);
        let mut runner = ScriptedProjectRunner::new([
            failing_run("test result: FAILED"),
            passing_run(),
            passing_run(),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        assert_eq!(report.outcome, TerminalOutcome::Completed);
        assert_eq!(report.state.phase, Phase::Done);
        assert_eq!(report.commits().len(), 2);
        let messages = vcs.messages();
        assert!(messages[0].starts_with("feat:"), "{messages:?}");
        assert!(messages[0].contains("tests/test_add.rs"));
        assert!(messages[1].starts_with("refactor:"));
        assert_eq!(
            vcs.staged_before_commit(0),
            vec!["tests/test_add.rs".to_string(), "src/lib.rs".to_string()]
        );
        assert_eq!(llm.calls(), 3);
    }

    #[test]
    fn implementer_exhaustion_aborts_after_exact_budget() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() { todo!() }")),
            Ok(source_block("src/lib.rs", "pub fn add() { panic!() }")),
            Ok(source_block("src/lib.rs", "pub fn add() { loop {} }")),
            Ok(source_block("src/lib.rs", "never requested")),
        ]);
        let mut runner = ScriptedProjectRunner::new([
            failing_run("test result: FAILED"),
            failing_run("test result: FAILED"),
            failing_run("test result: FAILED"),
            failing_run("test result: FAILED"),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert_eq!(reason.message, "implementer exhausted");
        assert_eq!(reason.phase, Phase::Green);
        assert_eq!(reason.attempts, 3);
        assert!(reason.exhausted);
        assert_eq!(report.state.phase, Phase::Failed);
        assert_eq!(llm.calls(), 4, "one tester call plus three implementer calls");
        assert!(vcs.messages().is_empty());
        assert_eq!(harness.read("src/lib.rs").as_deref(), Some(""));
    }

    #[test]
    fn passing_red_test_is_rejected_and_retried() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_trivial.rs", "#[test] fn t() {}")),
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok("NO_REFACTOR_NEEDED".to_string()),
        ]);
        let mut runner = ScriptedProjectRunner::new([
            passing_run(),
            failing_run("test result: FAILED"),
            passing_run(),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        assert_eq!(report.outcome, TerminalOutcome::Completed);
        let first = &report.history()[0];
        assert_eq!(first.phase, Phase::Red);
        assert_eq!(first.attempt_number, 1);
        assert_eq!(
            first.rejection.as_ref().map(|r| r.kind),
            Some(RejectionKind::Precondition)
        );
        assert_eq!(report.history()[1].attempt_number, 2);
        assert!(harness.read("tests/test_trivial.rs").is_none(), "rejected test removed");

        let second_prompt = &llm.prompts()[1];
        assert!(second_prompt.user.contains("already passes"));

        assert_eq!(vcs.messages().len(), 1, "declined refactor makes no commit");
    }

    #[test]
    fn unparseable_reply_consumes_an_attempt() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok("I think you should write a test.".to_string()),
            Ok("still no code".to_string()),
        ]);
        let mut runner = ScriptedProjectRunner::new([]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 2));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort");
        };
        assert_eq!(reason.message, "tester exhausted");
        assert_eq!(reason.attempts, 2);
        assert_eq!(runner.runs(), 0, "no tests run for unparseable replies");
        assert!(
            report
                .history()
                .iter()
                .all(|r| r.rejection.as_ref().map(|r| r.kind) == Some(RejectionKind::Parse))
        );
    }

    #[test]
    fn tester_decline_ends_with_exhausted() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([Ok("NO_MORE_TESTS".to_string())]);
        let mut runner = ScriptedProjectRunner::new([]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(3, 3));

        assert_eq!(report.outcome, TerminalOutcome::Exhausted);
        assert!(report.outcome.is_success());
        assert!(report.history()[0].declined);
    }

    #[test]
    fn llm_failure_aborts_without_retry() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Err(LlmError::InvalidResponse("boom".to_string())),
            Ok(test_block("tests/test_add.rs", "never requested")),
        ]);
        let mut runner = ScriptedProjectRunner::new([]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 5));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort");
        };
        assert!(reason.message.contains("boom"), "{}", reason.message);
        assert!(!reason.exhausted);
        assert_eq!(reason.phase, Phase::Red);
        assert_eq!(llm.calls(), 1);
        assert!(report.history().is_empty());
    }

    #[test]
    fn refactor_exhaustion_keeps_green_commit_and_restores_tree() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok(source_block("src/lib.rs", "pub fn broken() {}")),
            Ok(source_block("src/lib.rs", "pub fn broken_again() {}")),
        ]);
        let mut runner = ScriptedProjectRunner::new([
            failing_run("test result: FAILED"),
            passing_run(),
            failing_run("test result: FAILED"),
            failing_run("test result: FAILED"),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(2, 2));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort");
        };
        assert_eq!(reason.message, "refactorer exhausted");
        assert_eq!(reason.phase, Phase::Refactor);
        assert_eq!(vcs.messages().len(), 1);
        assert!(vcs.messages()[0].starts_with("feat:"));
        assert_eq!(harness.read("src/lib.rs").as_deref(), Some("pub fn add() {}\n"));
    }

    #[test]
    fn implementer_retry_sees_latest_test_log() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn ad() {}")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok("NO_REFACTOR_NEEDED".to_string()),
        ]);
        let mut runner = ScriptedProjectRunner::new([
            failing_run("unresolved import `kata::add`"),
            failing_run("cannot find function `add`, help: a function `ad` exists"),
            passing_run(),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        assert_eq!(report.outcome, TerminalOutcome::Completed);
        let prompts = llm.prompts();
        assert!(prompts[1].user.contains("unresolved import"));
        assert!(prompts[2].user.contains("a function `ad` exists"));
        assert!(prompts[2].user.contains("still fail"));
    }

    #[test]
    fn retry_feedback_accumulates_within_a_phase() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok("Here is my plan for a test.".to_string()),
            Ok(test_block("tests/test_trivial.rs", "#[test] fn t() {}")),
            Ok("NO_MORE_TESTS".to_string()),
        ]);
        let mut runner = ScriptedProjectRunner::new([passing_run()]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        assert_eq!(report.outcome, TerminalOutcome::Exhausted);
        let prompts = llm.prompts();
        assert!(!prompts[0].user.contains("was rejected"));
        assert!(prompts[1].user.contains("Attempt 1 was rejected"));
        let third = &prompts[2].user;
        assert!(third.contains("Attempt 1 was rejected"), "{third}");
        assert!(third.contains("could not be used"), "{third}");
        assert!(third.contains("Attempt 2 was rejected"), "{third}");
        assert!(third.contains("already passes"), "{third}");
    }

    #[test]
    fn feedback_resets_when_the_phase_changes() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok("no test yet".to_string()),
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok("NO_REFACTOR_NEEDED".to_string()),
        ]);
        let mut runner = ScriptedProjectRunner::new([failing_run("unresolved import"), passing_run()]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        assert_eq!(report.outcome, TerminalOutcome::Completed);
        assert!(llm.prompts()[1].user.contains("Attempt 1 was rejected"));
        assert!(!llm.prompts()[2].user.contains("was rejected"));
    }

    #[test]
    fn test_run_error_aborts_and_restores_edits() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
            Ok(source_block("src/lib.rs", "never requested")),
        ]);
        let mut runner = ScriptedProjectRunner::from_results([
            Ok(failing_run("unresolved import")),
            Err(anyhow::anyhow!("spawn cargo: No such file or directory")),
        ]);
        let mut vcs = RecordingVcs::default();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert!(!reason.exhausted);
        assert_eq!(reason.phase, Phase::Green);
        assert_eq!(reason.attempts, 1);
        assert!(reason.message.contains("spawn cargo"), "{}", reason.message);
        assert_eq!(report.state.attempts_in_phase, 0, "no attempt consumed");
        assert_eq!(llm.calls(), 2);
        assert_eq!(runner.runs(), 2);
        assert_eq!(harness.read("src/lib.rs").as_deref(), Some(""));
        assert!(vcs.messages().is_empty());
    }

    #[test]
    fn commit_failure_aborts_without_recording_a_commit() {
        let harness = Harness::new();
        let llm = ScriptedLlm::new([
            Ok(test_block("tests/test_add.rs", "use kata::add;")),
            Ok(source_block("src/lib.rs", "pub fn add() {}")),
        ]);
        let mut runner = ScriptedProjectRunner::new([failing_run("unresolved import"), passing_run()]);
        let mut vcs = RecordingVcs::failing_commits();

        let report = harness.run(&llm, &mut runner, &mut vcs, config(1, 3));

        let TerminalOutcome::Aborted(reason) = &report.outcome else {
            panic!("expected abort, got {:?}", report.outcome);
        };
        assert!(!reason.exhausted);
        assert_eq!(reason.phase, Phase::Green);
        assert!(reason.message.contains("index.lock"), "{}", reason.message);
        assert_eq!(report.state.attempts_in_phase, 0);
        assert!(report.commits().is_empty());
        assert!(vcs.messages().is_empty());
        assert_eq!(harness.read("src/lib.rs").as_deref(), Some(""));
    }

    #[test]
    fn log_tail_respects_char_boundaries() {
        let log = "é".repeat(FEEDBACK_LOG_TAIL_BYTES);
        let tail = log_tail(&log);
        assert!(tail.len() <= FEEDBACK_LOG_TAIL_BYTES);
        assert!(tail.chars().all(|c| c == 'é'));
    }
}
