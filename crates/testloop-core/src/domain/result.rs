//! Test results and their four-way status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single test execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Timeout,
    Error,
}

impl TestStatus {
    /// Upper-case label used in status lines (`PASSED`, `FAILED`, ...).
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Timeout => "TIMEOUT",
            TestStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one resource execution.
///
/// The enum shape carries the field invariants: only `Passed` and `Failed`
/// have output (required for `Failed`), only `Error` has an error message.
/// The constructors clamp `finished_at` so it is never before `started_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestResult {
    Passed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Failed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: String,
    },
    Timeout {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    },
    Error {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: String,
    },
}

fn ordered(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> DateTime<Utc> {
    finished_at.max(started_at)
}

impl TestResult {
    pub fn passed(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: Option<String>,
    ) -> Self {
        Self::Passed {
            started_at,
            finished_at: ordered(started_at, finished_at),
            output,
        }
    }

    pub fn failed(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        output: impl Into<String>,
    ) -> Self {
        Self::Failed {
            started_at,
            finished_at: ordered(started_at, finished_at),
            output: output.into(),
        }
    }

    pub fn timeout(started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        Self::Timeout {
            started_at,
            finished_at: ordered(started_at, finished_at),
        }
    }

    pub fn error(
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self::Error {
            started_at,
            finished_at: ordered(started_at, finished_at),
            error: error.into(),
        }
    }

    pub fn status(&self) -> TestStatus {
        match self {
            Self::Passed { .. } => TestStatus::Passed,
            Self::Failed { .. } => TestStatus::Failed,
            Self::Timeout { .. } => TestStatus::Timeout,
            Self::Error { .. } => TestStatus::Error,
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match self {
            Self::Passed { started_at, .. }
            | Self::Failed { started_at, .. }
            | Self::Timeout { started_at, .. }
            | Self::Error { started_at, .. } => *started_at,
        }
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        match self {
            Self::Passed { finished_at, .. }
            | Self::Failed { finished_at, .. }
            | Self::Timeout { finished_at, .. }
            | Self::Error { finished_at, .. } => *finished_at,
        }
    }

    /// Captured output, present only for `passed` and `failed`.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Passed { output, .. } => output.as_deref(),
            Self::Failed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Framework-level error message, present only for `error`.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Wall-clock duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at() - self.started_at())
            .num_milliseconds()
            .max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_constructors_clamp_finished_at() {
        let start = Utc::now();
        let result = TestResult::failed(start, start - Duration::seconds(5), "boom");
        assert_eq!(result.finished_at(), start);
        assert_eq!(result.duration_ms(), 0);
    }

    #[test]
    fn test_output_presence_by_status() {
        let now = Utc::now();
        assert_eq!(
            TestResult::passed(now, now, Some("ok".into())).output(),
            Some("ok")
        );
        assert_eq!(TestResult::failed(now, now, "bad").output(), Some("bad"));
        assert_eq!(TestResult::timeout(now, now).output(), None);
        assert_eq!(TestResult::error(now, now, "spawn").output(), None);
        assert_eq!(
            TestResult::error(now, now, "spawn").error_message(),
            Some("spawn")
        );
    }

    #[test]
    fn test_serde_uses_status_tag() {
        let now = Utc::now();
        let json = serde_json::to_value(TestResult::timeout(now, now)).unwrap();
        assert_eq!(json["status"], "timeout");
        assert!(json.get("output").is_none());

        let json = serde_json::to_value(TestResult::passed(now, now, None)).unwrap();
        assert_eq!(json["status"], "passed");
        assert!(json.get("output").is_none());
    }

    #[test]
    fn test_failed_requires_output_on_deserialize() {
        let raw = r#"{"status":"failed","started_at":"2024-01-01T00:00:00Z","finished_at":"2024-01-01T00:00:01Z"}"#;
        assert!(serde_json::from_str::<TestResult>(raw).is_err());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(TestStatus::Passed.to_string(), "PASSED");
        assert_eq!(TestStatus::Failed.to_string(), "FAILED");
        assert_eq!(TestStatus::Timeout.to_string(), "TIMEOUT");
        assert_eq!(TestStatus::Error.to_string(), "ERROR");
    }
}
