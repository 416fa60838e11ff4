//! Human-gated repair loop.
//!
//! One cycle: run the selected tests, fold the results into session state,
//! ask for confirmation when something failed, and, once approved, dispatch an
//! isolated repair request to the agent between a checkpoint and its restore.

pub mod controller;
pub mod request;

pub use controller::{
    ConfirmationMode, ControllerConfig, CycleOutcome, CycleRequest, LoopState, RepairDispatch,
    RepairLoopController,
};
pub use request::{approval_request, ModifyScope, RepairRequest};
