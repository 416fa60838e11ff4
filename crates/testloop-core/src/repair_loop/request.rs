//! Repair request construction and prompt text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::collaborators::ApprovalRequest;
use crate::domain::error::TestLoopError;

/// Instruction given to the agent ahead of every repair request.
pub const REPAIR_SYSTEM_INSTRUCTION: &str = "You are an expert code repair engineer. \
Investigate the failing tests below, find the root cause, and apply minimal, targeted fixes \
that resolve the failures without breaking existing behaviour. Validate your changes before \
finishing.";

/// Header of the confirmation prompt; the failure report follows it.
pub const CONFIRMATION_HEADER: &str =
    "The following tests failed. Would you like to ask the agent to automatically repair the errors?";

/// Which side of a failure the agent may change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifyScope {
    /// Fix the implementation only; leave tests untouched.
    Code,
    /// Fix the tests only; leave the implementation untouched.
    Test,
    /// Let the agent decide.
    #[default]
    Either,
}

impl ModifyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModifyScope::Code => "code",
            ModifyScope::Test => "test",
            ModifyScope::Either => "either",
        }
    }

    /// Scope-specific instruction text.
    pub fn instructions(&self) -> &'static str {
        match self {
            ModifyScope::Code => {
                "Analyze the test failures and fix the underlying code so the tests pass. \
                 Only change the implementation; do not modify the tests themselves."
            }
            ModifyScope::Test => {
                "Analyze the test failures and fix the test code so it passes. \
                 Only change the tests; do not modify the underlying implementation."
            }
            ModifyScope::Either => {
                "Analyze the test failures and decide whether the underlying code or the \
                 tests are wrong, then fix whichever is at fault."
            }
        }
    }
}

impl fmt::Display for ModifyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModifyScope {
    type Err = TestLoopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "code" => Ok(ModifyScope::Code),
            "test" => Ok(ModifyScope::Test),
            "either" => Ok(ModifyScope::Either),
            other => Err(TestLoopError::Configuration(format!(
                "invalid modify scope {other:?}; use code, test, or either"
            ))),
        }
    }
}

/// Work item handed to the agent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairRequest {
    pub instructions: String,
    pub failure_report: String,
    pub modify: ModifyScope,
}

impl RepairRequest {
    pub fn new(failure_report: impl Into<String>, modify: ModifyScope) -> Self {
        Self {
            instructions: format!("{REPAIR_SYSTEM_INSTRUCTION}\n\n{}", modify.instructions()),
            failure_report: failure_report.into(),
            modify,
        }
    }

    /// Full prompt text: instructions followed by the failure report.
    pub fn render(&self) -> String {
        format!(
            "{}\n\nAfter running the test suite, the following tests failed:\n\n{}",
            self.instructions, self.failure_report
        )
    }
}

/// Build the confirmation prompt for a frozen failure report.
pub fn approval_request(failure_report: &str, timeout_seconds: Option<u64>) -> ApprovalRequest {
    ApprovalRequest {
        message: format!("{CONFIRMATION_HEADER}\n{failure_report}"),
        default: false,
        timeout_seconds,
    }
}
