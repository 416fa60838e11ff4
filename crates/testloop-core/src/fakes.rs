//! In-memory fakes for the resource and collaborator traits (testing only).
//!
//! Provides `StaticResource`, `RecordingReporter`, `ScriptedApprover`, and
//! `MemorySession`, which satisfy the trait contracts without a terminal, a
//! shell, or an agent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::checkpoint::Checkpoint;
use crate::collaborators::{AgentSession, ApprovalRequest, Approver, ConversationScope, Reporter};
use crate::domain::error::{Result, TestLoopError};
use crate::domain::result::{TestResult, TestStatus};
use crate::repair_loop::request::RepairRequest;
use crate::resource::{TestContext, TestResource};

// ---------------------------------------------------------------------------
// StaticResource
// ---------------------------------------------------------------------------

/// Resource that always produces the same outcome.
#[derive(Debug)]
pub struct StaticResource {
    status: TestStatus,
    text: String,
    delay: Option<Duration>,
    runs: AtomicUsize,
}

impl StaticResource {
    fn with_status(status: TestStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            delay: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn passing(output: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Passed, output)
    }

    pub fn failing(output: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Failed, output)
    }

    pub fn timing_out() -> Self {
        Self::with_status(TestStatus::Timeout, "")
    }

    pub fn erroring(error: impl Into<String>) -> Self {
        Self::with_status(TestStatus::Error, error)
    }

    /// Sleep for `delay` before producing the outcome.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TestResource for StaticResource {
    fn description(&self) -> &str {
        "static test outcome"
    }

    async fn run_test(&self, _ctx: &TestContext) -> TestResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let finished_at = Utc::now();
        match self.status {
            TestStatus::Passed => {
                let output = (!self.text.is_empty()).then(|| self.text.clone());
                TestResult::passed(started_at, finished_at, output)
            }
            TestStatus::Failed => TestResult::failed(started_at, finished_at, self.text.clone()),
            TestStatus::Timeout => TestResult::timeout(started_at, finished_at),
            TestStatus::Error => TestResult::error(started_at, finished_at, self.text.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// One call made on a [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportLine {
    Info(String),
    Error(String),
    Chat(String),
    BusyStarted(String),
    BusyFinished(String),
}

/// Reporter that records every call in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<ReportLine>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ReportLine> {
        self.lines.lock().unwrap().clone()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.filter(|line| match line {
            ReportLine::Info(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.filter(|line| match line {
            ReportLine::Error(text) => Some(text.clone()),
            _ => None,
        })
    }

    pub fn chat_lines(&self) -> Vec<String> {
        self.filter(|line| match line {
            ReportLine::Chat(text) => Some(text.clone()),
            _ => None,
        })
    }

    fn filter(&self, f: impl Fn(&ReportLine) -> Option<String>) -> Vec<String> {
        self.lines.lock().unwrap().iter().filter_map(f).collect()
    }

    fn push(&self, line: ReportLine) {
        self.lines.lock().unwrap().push(line);
    }
}

impl Reporter for RecordingReporter {
    fn info_line(&self, line: &str) {
        self.push(ReportLine::Info(line.to_string()));
    }

    fn error_line(&self, line: &str) {
        self.push(ReportLine::Error(line.to_string()));
    }

    fn chat_output(&self, text: &str) {
        self.push(ReportLine::Chat(text.to_string()));
    }

    fn busy_started(&self, label: &str) {
        self.push(ReportLine::BusyStarted(label.to_string()));
    }

    fn busy_finished(&self, label: &str) {
        self.push(ReportLine::BusyFinished(label.to_string()));
    }
}

// ---------------------------------------------------------------------------
// ScriptedApprover
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum ApproverMode {
    /// Pop answers in order; once exhausted, repeat `fallback`.
    Script { answers: VecDeque<bool>, fallback: bool },
    /// Never resolve.
    Silent,
    /// Fail every request.
    Broken(String),
}

/// Approver that answers from a script and records every request.
#[derive(Debug)]
pub struct ScriptedApprover {
    mode: Mutex<ApproverMode>,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApprover {
    fn with_mode(mode: ApproverMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(answer: bool) -> Self {
        Self::scripted(Vec::new(), answer)
    }

    pub fn scripted(answers: Vec<bool>, fallback: bool) -> Self {
        Self::with_mode(ApproverMode::Script {
            answers: answers.into(),
            fallback,
        })
    }

    /// An approver whose user never answers.
    pub fn silent() -> Self {
        Self::with_mode(ApproverMode::Silent)
    }

    pub fn broken(reason: impl Into<String>) -> Self {
        Self::with_mode(ApproverMode::Broken(reason.into()))
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Approver for ScriptedApprover {
    async fn ask_for_approval(&self, request: &ApprovalRequest) -> anyhow::Result<bool> {
        self.requests.lock().unwrap().push(request.clone());
        let answer = {
            let mut mode = self.mode.lock().unwrap();
            match &mut *mode {
                ApproverMode::Script { answers, fallback } => {
                    Some(answers.pop_front().unwrap_or(*fallback))
                }
                ApproverMode::Silent => None,
                ApproverMode::Broken(reason) => anyhow::bail!("approver failed: {reason}"),
            }
        };
        match answer {
            Some(answer) => Ok(answer),
            None => std::future::pending().await,
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySession
// ---------------------------------------------------------------------------

/// What [`MemorySession::dispatch_repair`] does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchBehavior {
    /// Append a transcript entry and succeed.
    Succeed,
    /// Append a transcript entry and fail with the given reason.
    Fail(String),
    /// Append a transcript entry and panic.
    Panic,
}

#[derive(Debug, Default)]
struct Transcript {
    messages: Vec<String>,
    current: Option<String>,
}

/// Agent session backed by an in-memory transcript.
///
/// Checkpoints capture the transcript; a repair dispatch appends to it, so a
/// restored transcript proves the checkpoint was honoured.
#[derive(Debug)]
pub struct MemorySession {
    transcript: Mutex<Transcript>,
    behavior: DispatchBehavior,
    fail_checkpoint: bool,
    dispatched: Mutex<Vec<RepairRequest>>,
    resets: Mutex<Vec<ConversationScope>>,
    checkpoints: AtomicUsize,
    restores: AtomicUsize,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self {
            transcript: Mutex::new(Transcript::default()),
            behavior: DispatchBehavior::Succeed,
            fail_checkpoint: false,
            dispatched: Mutex::new(Vec::new()),
            resets: Mutex::new(Vec::new()),
            checkpoints: AtomicUsize::new(0),
            restores: AtomicUsize::new(0),
        }
    }
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dispatch(mut self, behavior: DispatchBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Make `generate_checkpoint` fail.
    pub fn with_failing_checkpoint(mut self) -> Self {
        self.fail_checkpoint = true;
        self
    }

    pub fn push_message(&self, message: impl Into<String>) {
        self.transcript.lock().unwrap().messages.push(message.into());
    }

    pub fn set_current_message(&self, message: Option<String>) {
        self.transcript.lock().unwrap().current = message;
    }

    pub fn messages(&self) -> Vec<String> {
        self.transcript.lock().unwrap().messages.clone()
    }

    pub fn current_message(&self) -> Option<String> {
        self.transcript.lock().unwrap().current.clone()
    }

    pub fn dispatched(&self) -> Vec<RepairRequest> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn resets(&self) -> Vec<ConversationScope> {
        self.resets.lock().unwrap().clone()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.load(Ordering::SeqCst)
    }

    pub fn restore_count(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentSession for MemorySession {
    fn generate_checkpoint(&self) -> Result<Checkpoint> {
        if self.fail_checkpoint {
            return Err(TestLoopError::Checkpoint(
                "session refused to checkpoint".to_string(),
            ));
        }
        self.checkpoints.fetch_add(1, Ordering::SeqCst);
        let transcript = self.transcript.lock().unwrap();
        Checkpoint::capture(json!({
            "messages": transcript.messages,
            "current": transcript.current,
        }))
    }

    fn restore_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let messages: Vec<String> =
            serde_json::from_value(checkpoint.payload["messages"].clone())?;
        let current: Option<String> =
            serde_json::from_value(checkpoint.payload["current"].clone())?;
        let mut transcript = self.transcript.lock().unwrap();
        transcript.messages = messages;
        transcript.current = current;
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset_conversation(&self, scope: ConversationScope) {
        self.resets.lock().unwrap().push(scope);
        let mut transcript = self.transcript.lock().unwrap();
        transcript.current = None;
        if scope == ConversationScope::History {
            transcript.messages.clear();
        }
    }

    async fn dispatch_repair(&self, request: &RepairRequest) -> anyhow::Result<()> {
        self.dispatched.lock().unwrap().push(request.clone());
        self.push_message(request.render());
        match &self.behavior {
            DispatchBehavior::Succeed => Ok(()),
            DispatchBehavior::Fail(reason) => anyhow::bail!("{reason}"),
            DispatchBehavior::Panic => panic!("repair agent crashed"),
        }
    }
}
