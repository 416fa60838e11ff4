//! Domain models for Testloop.
//!
//! Canonical definitions for the core entities:
//! - `TestResult`: Outcome of one resource execution
//! - `TestingState`: Per-session results and repair counter
//! - `TestingConfig`: Agent defaults, repair settings, resource configs

pub mod config;
pub mod error;
pub mod result;
pub mod state;

pub use config::{AgentDefaults, RepairConfig, ResourceConfig, ShellResourceConfig, TestingConfig};
pub use error::{Result, TestLoopError};
pub use result::{TestResult, TestStatus};
pub use state::TestingState;
