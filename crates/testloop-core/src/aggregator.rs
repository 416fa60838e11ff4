//! Result aggregation: pass/fail folding and the failure report.
//!
//! Everything here is a pure function of its input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::result::{TestResult, TestStatus};

/// Body used for a `timeout` result in the failure report.
pub const TIMEOUT_MARKER: &str = "Test timed out";

/// Prefix used for an `error` result in the failure report.
pub const ERROR_MARKER: &str = "Test errored:";

/// Counts per status for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errored: usize,
}

impl RunSummary {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} passed, {} failed, {} timed out, {} errored",
            self.passed, self.total, self.failed, self.timed_out, self.errored
        )
    }
}

/// True iff every result passed (vacuously true when empty).
pub fn all_passed(results: &BTreeMap<String, TestResult>) -> bool {
    results.values().all(TestResult::is_passed)
}

/// Count results per status.
pub fn summarize<'a, I>(results: I) -> RunSummary
where
    I: IntoIterator<Item = &'a TestResult>,
{
    let mut summary = RunSummary::default();
    for result in results {
        summary.total += 1;
        match result.status() {
            TestStatus::Passed => summary.passed += 1,
            TestStatus::Failed => summary.failed += 1,
            TestStatus::Timeout => summary.timed_out += 1,
            TestStatus::Error => summary.errored += 1,
        }
    }
    summary
}

/// Build the failure report: one `[name]` block per non-passed result, in
/// iteration order. Empty iff every result passed.
pub fn build_failure_report<'a, I>(entries: I, crop: usize) -> String
where
    I: IntoIterator<Item = (&'a str, &'a TestResult)>,
{
    let mut report = String::new();
    for (name, result) in entries {
        if let Some(block) = failure_block(name, result, crop) {
            report.push_str(&block);
        }
    }
    report
}

/// The report block for a single result, or `None` if it passed.
pub fn failure_block(name: &str, result: &TestResult, crop: usize) -> Option<String> {
    let body = match result {
        TestResult::Passed { .. } => return None,
        TestResult::Failed { output, .. } => crop_output(output, crop),
        TestResult::Timeout { .. } => TIMEOUT_MARKER.to_string(),
        TestResult::Error { error, .. } => format!("{ERROR_MARKER} {error}"),
    };
    Some(format!("[{name}]\n{body}\n\n"))
}

/// Keep the last `max` characters of `text`, marking how much was dropped.
pub fn crop_output(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        return text.to_string();
    }
    let dropped = total - max;
    let tail: String = text.chars().skip(dropped).collect();
    format!("...[cropped {dropped} chars]\n{tail}")
}
