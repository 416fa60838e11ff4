//! Testloop Core Library
//!
//! Test orchestration and the human-gated repair loop: a registry of
//! pluggable test resources, a sequential coordinator, result aggregation,
//! and a controller that asks before handing failures to an AI agent.

pub mod aggregator;
pub mod checkpoint;
pub mod collaborators;
pub mod coordinator;
pub mod domain;
pub mod fakes;
pub mod obs;
pub mod registry;
pub mod repair_loop;
pub mod resource;
pub mod state;
pub mod telemetry;

pub use aggregator::{
    all_passed, build_failure_report, crop_output, summarize, RunSummary, ERROR_MARKER,
    TIMEOUT_MARKER,
};
pub use checkpoint::{Checkpoint, CheckpointGuard};
pub use collaborators::{
    AgentSession, ApprovalRequest, Approver, BusyScope, Collaborators, ConversationScope, Reporter,
};
pub use coordinator::{CoordinatorConfig, TestExecutionCoordinator, TestRun};
pub use domain::{
    AgentDefaults, RepairConfig, ResourceConfig, Result, ShellResourceConfig, TestLoopError,
    TestResult, TestStatus, TestingConfig, TestingState,
};
pub use registry::{RegistryEntry, ResourceRegistry};
pub use repair_loop::{
    ConfirmationMode, ControllerConfig, CycleOutcome, CycleRequest, LoopState, ModifyScope,
    RepairDispatch, RepairLoopController, RepairRequest,
};
pub use resource::{TestContext, TestResource};
pub use state::SessionStateStore;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
