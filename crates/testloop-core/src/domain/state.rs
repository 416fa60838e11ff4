//! Per-session testing state slice.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::AgentDefaults;
use super::result::TestResult;

/// Latest results, the repair counter, and its ceiling for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestingState {
    pub test_results: BTreeMap<String, TestResult>,
    pub repair_count: u32,
    pub max_auto_repairs: u32,
}

impl TestingState {
    pub fn new(defaults: &AgentDefaults) -> Self {
        Self {
            test_results: BTreeMap::new(),
            repair_count: 0,
            max_auto_repairs: defaults.max_auto_repairs,
        }
    }

    /// Whether the current repair count is still inside the auto-repair ceiling.
    pub fn within_auto_repair_limit(&self) -> bool {
        self.repair_count <= self.max_auto_repairs
    }

    /// Human-readable status lines.
    pub fn show(&self) -> Vec<String> {
        let mut lines = vec!["Test Results:".to_string()];
        for (name, result) in &self.test_results {
            let mut line = format!("[Test: {}]: {}", name, result.status());
            if let Some(error) = result.error_message() {
                line.push('\n');
                line.push_str(error);
            }
            lines.push(line);
        }
        lines.push(String::new());
        lines.push(format!("Total Repairs: {}", self.repair_count));
        lines
    }
}
