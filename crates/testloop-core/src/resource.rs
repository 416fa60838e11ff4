//! Test resource trait and execution context.
//!
//! A resource encodes every expected outcome (failure, timeout, framework
//! fault) in the returned [`TestResult`]; it never returns an error for them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::result::TestResult;

/// Ambient state shared by all resources in one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestContext {
    /// Root that relative working directories resolve against.
    pub workspace_root: PathBuf,

    /// Extra environment passed to every resource.
    pub env: BTreeMap<String, String>,
}

impl TestContext {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Resolve `dir` against the workspace root (absolute paths pass through).
    pub fn resolve(&self, dir: Option<&Path>) -> PathBuf {
        match dir {
            Some(dir) if dir.is_absolute() => dir.to_path_buf(),
            Some(dir) => self.workspace_root.join(dir),
            None => self.workspace_root.clone(),
        }
    }
}

/// A named, pluggable unit that runs one test.
#[async_trait]
pub trait TestResource: Send + Sync {
    /// Human-readable description.
    fn description(&self) -> &str;

    /// Run the test and return its structured outcome.
    async fn run_test(&self, ctx: &TestContext) -> TestResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let ctx = TestContext::new("/work");
        assert_eq!(ctx.resolve(None), PathBuf::from("/work"));
        assert_eq!(
            ctx.resolve(Some(Path::new("crates/core"))),
            PathBuf::from("/work/crates/core")
        );
        assert_eq!(ctx.resolve(Some(Path::new("/tmp"))), PathBuf::from("/tmp"));
    }

    #[test]
    fn test_with_env_builder() {
        let ctx = TestContext::new(".").with_env("CI", "1");
        assert_eq!(ctx.env.get("CI").map(String::as_str), Some("1"));
    }
}
