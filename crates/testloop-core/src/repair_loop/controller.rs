//! Repair loop state machine.
//!
//! ```text
//! Idle -> Executing -> Evaluating -> AllPassed -> Idle
//!                                 -> AwaitingConfirmation -> Declined  -> Idle
//!                                                         -> TimedOut  -> Idle
//!                                                         -> Approved -> Repairing -> Idle
//! ```
//!
//! Every cycle ends in `Idle`, including cycles that fail with an error or
//! whose future is dropped mid-flight.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::RunSummary;
use crate::checkpoint::CheckpointGuard;
use crate::collaborators::{AgentSession, Approver, Collaborators, ConversationScope, Reporter};
use crate::coordinator::{CoordinatorConfig, TestExecutionCoordinator, TestRun};
use crate::domain::config::{TestingConfig, DEFAULT_CONFIRMATION_TIMEOUT_SECS};
use crate::domain::error::{Result, TestLoopError};
use crate::obs::{self, CycleSpan};
use crate::registry::ResourceRegistry;
use crate::resource::TestContext;
use crate::state::SessionStateStore;

use super::request::{approval_request, ModifyScope, RepairRequest};

/// Shown once every selected test passed.
pub const ALL_PASSED_MESSAGE: &str = "All tests passed!";

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Executing,
    Evaluating,
    AllPassed,
    AwaitingConfirmation,
    Approved,
    Declined,
    TimedOut,
    Repairing,
}

/// How a failing cycle obtains approval for a repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationMode {
    /// Ask the approver.
    #[default]
    Ask,
    /// The caller already asked for a repair; skip the prompt.
    Preapproved,
}

/// Parameters of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRequest {
    pub selector: String,
    pub modify: ModifyScope,
    pub confirmation: ConfirmationMode,
}

impl CycleRequest {
    /// Run tests and ask before repairing.
    pub fn run(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            modify: ModifyScope::default(),
            confirmation: ConfirmationMode::Ask,
        }
    }

    /// Run tests and repair failures without asking.
    pub fn repair(selector: impl Into<String>, modify: ModifyScope) -> Self {
        Self {
            selector: selector.into(),
            modify,
            confirmation: ConfirmationMode::Preapproved,
        }
    }
}

/// What happened to the repair request once it was handed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairDispatch {
    Completed,
    Failed { reason: String },
}

/// Terminal outcome of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoTestsMatched,
    AllPassed {
        summary: RunSummary,
    },
    Declined {
        summary: RunSummary,
        failure_report: String,
    },
    TimedOut {
        summary: RunSummary,
        failure_report: String,
    },
    Repaired {
        summary: RunSummary,
        failure_report: String,
        dispatch: RepairDispatch,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::NoTestsMatched => "no_tests_matched",
            CycleOutcome::AllPassed { .. } => "all_passed",
            CycleOutcome::Declined { .. } => "declined",
            CycleOutcome::TimedOut { .. } => "timed_out",
            CycleOutcome::Repaired { .. } => "repaired",
        }
    }

    pub fn summary(&self) -> Option<RunSummary> {
        match self {
            CycleOutcome::NoTestsMatched => None,
            CycleOutcome::AllPassed { summary }
            | CycleOutcome::Declined { summary, .. }
            | CycleOutcome::TimedOut { summary, .. }
            | CycleOutcome::Repaired { summary, .. } => Some(*summary),
        }
    }

    pub fn failure_report(&self) -> Option<&str> {
        match self {
            CycleOutcome::Declined { failure_report, .. }
            | CycleOutcome::TimedOut { failure_report, .. }
            | CycleOutcome::Repaired { failure_report, .. } => Some(failure_report),
            _ => None,
        }
    }
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Prompt timeout while the repair count is within the auto-repair ceiling.
    pub confirmation_timeout_seconds: u64,
    /// Conversation scope cleared before the repair request is dispatched.
    pub conversation_scope: ConversationScope,
    pub coordinator: CoordinatorConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            conversation_scope: ConversationScope::CurrentMessage,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl From<&TestingConfig> for ControllerConfig {
    fn from(config: &TestingConfig) -> Self {
        Self {
            confirmation_timeout_seconds: config.repair.confirmation_timeout_seconds,
            ..Self::default()
        }
    }
}

enum Confirmation {
    Approved,
    Declined,
    TimedOut,
}

/// Resets the controller to `Idle` however the cycle ends.
struct CycleGuard<'a> {
    state: &'a Mutex<LoopState>,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = LoopState::Idle;
    }
}

fn lock_state(state: &Mutex<LoopState>) -> std::sync::MutexGuard<'_, LoopState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives test cycles and the confirmation-gated repair of their failures.
pub struct RepairLoopController {
    registry: ResourceRegistry,
    coordinator: TestExecutionCoordinator,
    collaborators: Collaborators,
    store: Arc<SessionStateStore>,
    context: TestContext,
    config: ControllerConfig,
    state: Mutex<LoopState>,
}

impl std::fmt::Debug for RepairLoopController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairLoopController")
            .field("registry", &self.registry)
            .field("collaborators", &self.collaborators)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl RepairLoopController {
    pub fn new(
        registry: ResourceRegistry,
        collaborators: Collaborators,
        store: Arc<SessionStateStore>,
        context: TestContext,
    ) -> Self {
        Self::with_config(
            registry,
            collaborators,
            store,
            context,
            ControllerConfig::default(),
        )
    }

    pub fn with_config(
        registry: ResourceRegistry,
        collaborators: Collaborators,
        store: Arc<SessionStateStore>,
        context: TestContext,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            coordinator: TestExecutionCoordinator::new(config.coordinator),
            collaborators,
            store,
            context,
            config,
            state: Mutex::new(LoopState::Idle),
        }
    }

    pub fn state(&self) -> LoopState {
        *lock_state(&self.state)
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn state_store(&self) -> &Arc<SessionStateStore> {
        &self.store
    }

    /// Run one cycle to completion.
    ///
    /// # Errors
    ///
    /// - `CycleInProgress` if another cycle is running on this controller
    /// - `MissingCollaborator` before any test runs
    /// - checkpoint capture/restore failures from the agent session
    ///
    /// Failing tests and failed repair dispatches are outcomes, not errors.
    #[instrument(skip_all, fields(selector = %request.selector))]
    pub async fn run_cycle(&self, request: CycleRequest) -> Result<CycleOutcome> {
        let _cycle = self.begin()?;

        let (reporter, approver, session) = self.collaborators.require_all()?;

        let cycle_id = Uuid::new_v4().to_string();
        let span = CycleSpan::new(&cycle_id, &request.selector);
        let started = Instant::now();
        obs::emit_cycle_started(
            &cycle_id,
            &request.selector,
            request.confirmation == ConfirmationMode::Preapproved,
        );

        let outcome = self
            .drive(&cycle_id, &request, reporter, approver, session)
            .instrument(span.span())
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(outcome) => obs::emit_cycle_finished(&cycle_id, outcome.label(), elapsed_ms),
            Err(e) => {
                warn!(cycle_id = %cycle_id, error = %e, "cycle aborted");
                obs::emit_cycle_finished(&cycle_id, "error", elapsed_ms);
            }
        }
        outcome
    }

    /// Run every test after an agent turn that changed files.
    ///
    /// A clean workspace runs nothing and returns `None`.
    pub async fn after_turn(&self, files_dirty: bool) -> Result<Option<CycleOutcome>> {
        if !files_dirty {
            debug!("workspace unchanged; skipping automatic test run");
            return Ok(None);
        }
        self.run_cycle(CycleRequest::run("*")).await.map(Some)
    }

    fn begin(&self) -> Result<CycleGuard<'_>> {
        let mut state = lock_state(&self.state);
        if *state != LoopState::Idle {
            return Err(TestLoopError::CycleInProgress);
        }
        *state = LoopState::Executing;
        Ok(CycleGuard { state: &self.state })
    }

    fn transition(&self, to: LoopState) {
        let mut state = lock_state(&self.state);
        debug!(from = ?*state, to = ?to, "loop state transition");
        *state = to;
    }

    async fn drive(
        &self,
        cycle_id: &str,
        request: &CycleRequest,
        reporter: &dyn Reporter,
        approver: &dyn Approver,
        session: &dyn AgentSession,
    ) -> Result<CycleOutcome> {
        let run = self
            .coordinator
            .run_tests(&self.registry, &request.selector, &self.context, reporter)
            .await;
        self.transition(LoopState::Evaluating);

        if run.is_empty() {
            return Ok(CycleOutcome::NoTestsMatched);
        }
        let summary = run.summary();

        if run.all_passed() {
            self.transition(LoopState::AllPassed);
            self.record_pass(run);
            reporter.chat_output(ALL_PASSED_MESSAGE);
            return Ok(CycleOutcome::AllPassed { summary });
        }

        let failure_report = run.failure_report();
        let (repair_count, within_limit) = self.record_failure(run);
        self.transition(LoopState::AwaitingConfirmation);

        let confirmation = match request.confirmation {
            ConfirmationMode::Preapproved => {
                obs::emit_confirmation_resolved(cycle_id, "preapproved", repair_count);
                Confirmation::Approved
            }
            ConfirmationMode::Ask => {
                let timeout_seconds =
                    within_limit.then_some(self.config.confirmation_timeout_seconds);
                let confirmation =
                    confirm(approver, reporter, &failure_report, timeout_seconds).await;
                let resolution = match confirmation {
                    Confirmation::Approved => "approved",
                    Confirmation::Declined => "declined",
                    Confirmation::TimedOut => "timed_out",
                };
                obs::emit_confirmation_resolved(cycle_id, resolution, repair_count);
                confirmation
            }
        };

        match confirmation {
            Confirmation::Declined => {
                self.transition(LoopState::Declined);
                Ok(CycleOutcome::Declined {
                    summary,
                    failure_report,
                })
            }
            Confirmation::TimedOut => {
                self.transition(LoopState::TimedOut);
                reporter.info_line("No response to the repair prompt; skipping repair.");
                Ok(CycleOutcome::TimedOut {
                    summary,
                    failure_report,
                })
            }
            Confirmation::Approved => {
                self.transition(LoopState::Approved);
                reporter.info_line("Attempting to repair errors...");
                self.transition(LoopState::Repairing);
                let dispatch = self
                    .repair(cycle_id, &failure_report, request.modify, reporter, session)
                    .await?;
                Ok(CycleOutcome::Repaired {
                    summary,
                    failure_report,
                    dispatch,
                })
            }
        }
    }

    fn record_pass(&self, run: TestRun) {
        self.store.mutate(|state| {
            state.test_results.extend(run.into_results());
            state.repair_count = 0;
        });
    }

    /// Merge results and bump the repair counter; returns the new count and
    /// whether it is still within the auto-repair ceiling.
    fn record_failure(&self, run: TestRun) -> (u32, bool) {
        self.store.mutate(|state| {
            state.test_results.extend(run.into_results());
            state.repair_count = state.repair_count.saturating_add(1);
            (state.repair_count, state.within_auto_repair_limit())
        })
    }

    /// Checkpoint, isolate, dispatch, restore.
    async fn repair(
        &self,
        cycle_id: &str,
        failure_report: &str,
        modify: ModifyScope,
        reporter: &dyn Reporter,
        session: &dyn AgentSession,
    ) -> Result<RepairDispatch> {
        let guard = CheckpointGuard::acquire(session)?;
        session.reset_conversation(self.config.conversation_scope);

        let request = RepairRequest::new(failure_report, modify);
        let dispatched = AssertUnwindSafe(session.dispatch_repair(&request))
            .catch_unwind()
            .await;

        let dispatch = match dispatched {
            Ok(Ok(())) => RepairDispatch::Completed,
            Ok(Err(e)) => RepairDispatch::Failed {
                reason: format!("{e:#}"),
            },
            Err(panic) => RepairDispatch::Failed {
                reason: format!("repair agent panicked: {}", panic_message(panic.as_ref())),
            },
        };
        if let RepairDispatch::Failed { reason } = &dispatch {
            reporter.error_line(&format!("Repair failed: {reason}"));
            obs::emit_repair_failed(cycle_id, reason);
        }
        obs::emit_repair_dispatched(
            cycle_id,
            modify.as_str(),
            dispatch == RepairDispatch::Completed,
        );

        let checkpoint = guard.restore()?;
        obs::emit_checkpoint_restored(
            cycle_id,
            &checkpoint.checkpoint_id.to_string(),
            checkpoint.short_digest(),
        );
        Ok(dispatch)
    }
}

/// Ask the approver, enforcing the timeout when one is set.
///
/// A failing approver counts as a decline.
async fn confirm(
    approver: &dyn Approver,
    reporter: &dyn Reporter,
    failure_report: &str,
    timeout_seconds: Option<u64>,
) -> Confirmation {
    let request = approval_request(failure_report, timeout_seconds);
    let answer = match timeout_seconds {
        Some(secs) => {
            match tokio::time::timeout(
                Duration::from_secs(secs),
                approver.ask_for_approval(&request),
            )
            .await
            {
                Ok(answer) => answer,
                Err(_) => return Confirmation::TimedOut,
            }
        }
        None => approver.ask_for_approval(&request).await,
    };

    match answer {
        Ok(true) => Confirmation::Approved,
        Ok(false) => Confirmation::Declined,
        Err(e) => {
            warn!(error = %e, "confirmation request failed");
            reporter.error_line(&format!("Could not ask for confirmation: {e}"));
            Confirmation::Declined
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::AgentDefaults;
    use crate::fakes::{MemorySession, RecordingReporter, ScriptedApprover, StaticResource};
    use tracing_test::traced_test;

    fn controller(
        registry: ResourceRegistry,
        approver: ScriptedApprover,
    ) -> (RepairLoopController, Arc<MemorySession>, Arc<ScriptedApprover>) {
        let session = Arc::new(MemorySession::new());
        let approver = Arc::new(approver);
        let collaborators = Collaborators::new()
            .with_reporter(Arc::new(RecordingReporter::new()))
            .with_approver(approver.clone())
            .with_session(session.clone());
        let store = Arc::new(SessionStateStore::initialize(&AgentDefaults::default()));
        let controller =
            RepairLoopController::new(registry, collaborators, store, TestContext::default());
        (controller, session, approver)
    }

    fn single(name: &str, resource: StaticResource) -> ResourceRegistry {
        let mut registry = ResourceRegistry::new();
        registry.register(name, Arc::new(resource)).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_starts_and_ends_idle() {
        let (controller, _, _) = controller(
            single("unit", StaticResource::passing("")),
            ScriptedApprover::always(false),
        );
        assert_eq!(controller.state(), LoopState::Idle);
        let outcome = controller.run_cycle(CycleRequest::run("*")).await.unwrap();
        assert_eq!(outcome.label(), "all_passed");
        assert_eq!(controller.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_busy_controller_rejects_second_cycle() {
        let (controller, _, _) = controller(
            single("unit", StaticResource::passing("")),
            ScriptedApprover::always(false),
        );
        *controller.state.lock().unwrap() = LoopState::AwaitingConfirmation;
        let err = controller
            .run_cycle(CycleRequest::run("*"))
            .await
            .unwrap_err();
        assert!(matches!(err, TestLoopError::CycleInProgress));
    }

    #[tokio::test]
    async fn test_preapproved_skips_prompt() {
        let (controller, session, approver) = controller(
            single("unit", StaticResource::failing("boom")),
            ScriptedApprover::always(false),
        );
        let outcome = controller
            .run_cycle(CycleRequest::repair("*", ModifyScope::Code))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            CycleOutcome::Repaired {
                dispatch: RepairDispatch::Completed,
                ..
            }
        ));
        assert!(approver.requests().is_empty());
        assert_eq!(session.dispatched()[0].modify, ModifyScope::Code);
    }

    #[tokio::test]
    async fn test_failing_approver_counts_as_decline() {
        let (controller, session, _) = controller(
            single("unit", StaticResource::failing("boom")),
            ScriptedApprover::broken("terminal closed"),
        );
        let outcome = controller.run_cycle(CycleRequest::run("*")).await.unwrap();
        assert_eq!(outcome.label(), "declined");
        assert!(session.dispatched().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_capture_failure_propagates_and_resets() {
        let session = Arc::new(MemorySession::new().with_failing_checkpoint());
        let collaborators = Collaborators::new()
            .with_reporter(Arc::new(RecordingReporter::new()))
            .with_approver(Arc::new(ScriptedApprover::always(true)))
            .with_session(session.clone());
        let controller = RepairLoopController::new(
            single("unit", StaticResource::failing("boom")),
            collaborators,
            Arc::new(SessionStateStore::default()),
            TestContext::default(),
        );
        let err = controller
            .run_cycle(CycleRequest::run("*"))
            .await
            .unwrap_err();
        assert!(matches!(err, TestLoopError::Checkpoint(_)));
        assert!(session.dispatched().is_empty());
        assert_eq!(controller.state(), LoopState::Idle);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_cycle_emits_lifecycle_events() {
        let (controller, _, _) = controller(
            single("unit", StaticResource::failing("boom")),
            ScriptedApprover::always(true),
        );
        controller.run_cycle(CycleRequest::run("*")).await.unwrap();

        assert!(logs_contain("cycle.started"));
        assert!(logs_contain("test.finished"));
        assert!(logs_contain("confirmation.resolved"));
        assert!(logs_contain("repair.dispatched"));
        assert!(logs_contain("checkpoint.restored"));
        assert!(logs_contain("cycle.finished"));
    }

    #[tokio::test]
    async fn test_after_turn_skips_clean_workspace() {
        let resource = Arc::new(StaticResource::failing("boom"));
        let mut registry = ResourceRegistry::new();
        registry.register("unit", resource.clone()).unwrap();
        let (controller, _, approver) = controller(registry, ScriptedApprover::always(false));

        assert!(controller.after_turn(false).await.unwrap().is_none());
        assert_eq!(resource.run_count(), 0);
        assert_eq!(controller.state_store().snapshot().repair_count, 0);

        let outcome = controller.after_turn(true).await.unwrap().unwrap();
        assert_eq!(outcome.label(), "declined");
        assert_eq!(resource.run_count(), 1);
        assert_eq!(approver.requests().len(), 1);
        assert_eq!(controller.state_store().snapshot().repair_count, 1);
    }

    #[tokio::test]
    async fn test_repair_count_saturates() {
        let collaborators = Collaborators::new()
            .with_reporter(Arc::new(RecordingReporter::new()))
            .with_approver(Arc::new(ScriptedApprover::always(false)))
            .with_session(Arc::new(MemorySession::new()));
        let store = Arc::new(
            SessionStateStore::deserialize(
                r#"{"test_results":{},"repair_count":4294967295,"max_auto_repairs":5}"#,
            )
            .unwrap(),
        );
        let controller = RepairLoopController::new(
            single("unit", StaticResource::failing("boom")),
            collaborators,
            store.clone(),
            TestContext::default(),
        );

        let outcome = controller.run_cycle(CycleRequest::run("*")).await.unwrap();
        assert_eq!(outcome.label(), "declined");
        let state = store.snapshot();
        assert_eq!(state.repair_count, u32::MAX);
        assert!(!state.within_auto_repair_limit());
    }

    #[test]
    fn test_panic_message_extraction() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_config_from_testing_config() {
        let mut testing = TestingConfig::default();
        testing.repair.confirmation_timeout_seconds = 5;
        let config = ControllerConfig::from(&testing);
        assert_eq!(config.confirmation_timeout_seconds, 5);
        assert_eq!(config.conversation_scope, ConversationScope::CurrentMessage);
    }
}
