//! Contracts for the services the orchestration core depends on.
//!
//! - [`Reporter`]: line-oriented user output and the busy indicator
//! - [`Approver`]: interactive yes/no confirmation
//! - [`AgentSession`]: checkpoint/restore and repair dispatch
//!
//! [`Collaborators`] bundles them; a cycle fails with
//! `TestLoopError::MissingCollaborator` before running anything if one is absent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::domain::error::{Result, TestLoopError};
use crate::repair_loop::request::RepairRequest;

/// Line-oriented output channel of the owning session.
pub trait Reporter: Send + Sync {
    fn info_line(&self, line: &str);

    fn error_line(&self, line: &str);

    /// Final, chat-style output (summaries).
    fn chat_output(&self, text: &str);

    fn busy_started(&self, label: &str);

    fn busy_finished(&self, label: &str);
}

/// RAII busy indicator: started on creation, finished on drop.
pub struct BusyScope<'a> {
    reporter: &'a dyn Reporter,
    label: String,
}

impl<'a> BusyScope<'a> {
    pub fn enter(reporter: &'a dyn Reporter, label: impl Into<String>) -> Self {
        let label = label.into();
        reporter.busy_started(&label);
        Self { reporter, label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for BusyScope<'_> {
    fn drop(&mut self) {
        self.reporter.busy_finished(&self.label);
    }
}

/// A confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub message: String,
    /// Answer assumed when the user just presses enter.
    pub default: bool,
    /// `None` means wait for an explicit decision indefinitely.
    pub timeout_seconds: Option<u64>,
}

/// Interactive collaborator that asks a human to approve an action.
#[async_trait]
pub trait Approver: Send + Sync {
    async fn ask_for_approval(&self, request: &ApprovalRequest) -> anyhow::Result<bool>;
}

/// Which part of the conversation to clear before a repair turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationScope {
    /// Only the in-flight message.
    CurrentMessage,
    /// The whole message history.
    History,
}

/// The owning agent session.
#[async_trait]
pub trait AgentSession: Send + Sync {
    fn generate_checkpoint(&self) -> Result<Checkpoint>;

    fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn reset_conversation(&self, scope: ConversationScope);

    /// Hand the repair request to the AI agent and wait for it to finish.
    async fn dispatch_repair(&self, request: &RepairRequest) -> anyhow::Result<()>;
}

/// Optional slots for every collaborator the controller needs.
#[derive(Clone, Default)]
pub struct Collaborators {
    reporter: Option<Arc<dyn Reporter>>,
    approver: Option<Arc<dyn Approver>>,
    session: Option<Arc<dyn AgentSession>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("reporter", &self.reporter.is_some())
            .field("approver", &self.approver.is_some())
            .field("session", &self.session.is_some())
            .finish()
    }
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_session(mut self, session: Arc<dyn AgentSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn reporter(&self) -> Result<&dyn Reporter> {
        self.reporter
            .as_deref()
            .ok_or(TestLoopError::MissingCollaborator { service: "reporter" })
    }

    pub fn approver(&self) -> Result<&dyn Approver> {
        self.approver
            .as_deref()
            .ok_or(TestLoopError::MissingCollaborator { service: "approver" })
    }

    pub fn session(&self) -> Result<&dyn AgentSession> {
        self.session
            .as_deref()
            .ok_or(TestLoopError::MissingCollaborator { service: "agent session" })
    }

    /// All three collaborators, or the first one missing.
    pub fn require_all(&self) -> Result<(&dyn Reporter, &dyn Approver, &dyn AgentSession)> {
        Ok((self.reporter()?, self.approver()?, self.session()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemorySession, RecordingReporter, ReportLine, ScriptedApprover};

    #[test]
    fn test_busy_scope_brackets_work() {
        let reporter = RecordingReporter::new();
        {
            let scope = BusyScope::enter(&reporter, "Running test unit");
            assert_eq!(scope.label(), "Running test unit");
            reporter.info_line("inside");
        }
        assert_eq!(
            reporter.lines(),
            vec![
                ReportLine::BusyStarted("Running test unit".into()),
                ReportLine::Info("inside".into()),
                ReportLine::BusyFinished("Running test unit".into()),
            ]
        );
    }

    #[test]
    fn test_missing_collaborators_reported_by_name() {
        let empty = Collaborators::new();
        assert!(matches!(
            empty.require_all(),
            Err(TestLoopError::MissingCollaborator { service: "reporter" })
        ));

        let partial = Collaborators::new()
            .with_reporter(Arc::new(RecordingReporter::new()))
            .with_approver(Arc::new(ScriptedApprover::always(true)));
        assert!(matches!(
            partial.require_all(),
            Err(TestLoopError::MissingCollaborator {
                service: "agent session"
            })
        ));

        let full = partial.with_session(Arc::new(MemorySession::new()));
        let (reporter, _, _) = full.require_all().unwrap();
        reporter.info_line("ready");
    }
}
