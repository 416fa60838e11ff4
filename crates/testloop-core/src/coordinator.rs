//! Sequential test execution.
//!
//! Runs every resource a selector matches, one at a time, reporting progress
//! through the session [`Reporter`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::aggregator::{self, RunSummary};
use crate::collaborators::{BusyScope, Reporter};
use crate::domain::config::DEFAULT_CROP_OUTPUT;
use crate::domain::result::{TestResult, TestStatus};
use crate::obs;
use crate::registry::ResourceRegistry;
use crate::resource::TestContext;

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum characters of `failed` output kept per failure report block.
    pub crop_output: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            crop_output: DEFAULT_CROP_OUTPUT,
        }
    }
}

/// Results of one coordinator run, keyed by name, plus execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestRun {
    results: BTreeMap<String, TestResult>,
    order: Vec<String>,
    crop_output: usize,
}

impl TestRun {
    fn new(crop_output: usize) -> Self {
        Self {
            results: BTreeMap::new(),
            order: Vec::new(),
            crop_output,
        }
    }

    fn record(&mut self, name: String, result: TestResult) {
        self.order.push(name.clone());
        self.results.insert(name, result);
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn get(&self, name: &str) -> Option<&TestResult> {
        self.results.get(name)
    }

    pub fn results(&self) -> &BTreeMap<String, TestResult> {
        &self.results
    }

    pub fn into_results(self) -> BTreeMap<String, TestResult> {
        self.results
    }

    /// Names in the order they ran.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// `(name, result)` pairs in execution order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TestResult)> {
        self.order
            .iter()
            .filter_map(|name| self.results.get_key_value(name))
            .map(|(name, result)| (name.as_str(), result))
    }

    pub fn all_passed(&self) -> bool {
        aggregator::all_passed(&self.results)
    }

    /// Failure report in execution order; empty iff every test passed.
    pub fn failure_report(&self) -> String {
        aggregator::build_failure_report(self.iter(), self.crop_output)
    }

    pub fn summary(&self) -> RunSummary {
        aggregator::summarize(self.results.values())
    }
}

/// Runs selected resources strictly one after another.
#[derive(Debug, Clone, Default)]
pub struct TestExecutionCoordinator {
    config: CoordinatorConfig,
}

impl TestExecutionCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Run every resource `selector` matches and return the full mapping.
    ///
    /// An empty selection reports `No tests found matching "<selector>".` and
    /// returns an empty run. Resource outcomes never abort the run.
    #[instrument(skip_all, fields(selector = %selector))]
    pub async fn run_tests(
        &self,
        registry: &ResourceRegistry,
        selector: &str,
        ctx: &TestContext,
        reporter: &dyn Reporter,
    ) -> TestRun {
        let selected = registry.select(selector);
        let mut run = TestRun::new(self.config.crop_output);

        if selected.is_empty() {
            reporter.info_line(&format!("No tests found matching \"{selector}\"."));
            return run;
        }
        debug!(count = selected.len(), "running selected tests");

        for (name, resource) in selected {
            let result = {
                let _busy = BusyScope::enter(reporter, format!("Running test {name}"));
                resource.run_test(ctx).await
            };

            let status = result.status();
            let line = format!("[Test: {name}] : {status}");
            if status == TestStatus::Passed {
                reporter.info_line(&line);
            } else {
                reporter.error_line(&line);
            }
            obs::emit_test_finished(&name, status.label(), result.duration_ms());

            run.record(name, result);
        }
        run
    }
}
