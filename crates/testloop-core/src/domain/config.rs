//! Testing configuration: agent defaults, repair settings, and resources.
//!
//! Loaded from TOML. Resources are a closed, tagged set of variants keyed by
//! `type`; each variant maps to exactly one resource constructor.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{Result, TestLoopError};

pub const DEFAULT_MAX_AUTO_REPAIRS: u32 = 5;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CROP_OUTPUT: usize = 10_000;

/// Top-level testing configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestingConfig {
    #[serde(default)]
    pub agent_defaults: AgentDefaults,

    #[serde(default)]
    pub repair: RepairConfig,

    /// Resources in registration order.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Per-session defaults applied when a session attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentDefaults {
    #[serde(default = "default_max_auto_repairs")]
    pub max_auto_repairs: u32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_auto_repairs: DEFAULT_MAX_AUTO_REPAIRS,
        }
    }
}

/// Repair loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// Timeout applied to confirmation prompts while under the auto-repair ceiling.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_seconds: u64,

    /// Command the repair prompt is piped into (binary-side dispatcher).
    #[serde(default)]
    pub command: Option<String>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_seconds: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            command: None,
        }
    }
}

/// Closed set of resource configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceConfig {
    Shell(ShellResourceConfig),
}

impl ResourceConfig {
    pub fn name(&self) -> &str {
        match self {
            ResourceConfig::Shell(shell) => &shell.name,
        }
    }

    /// Check required fields without building the resource.
    pub fn validate(&self) -> Result<()> {
        match self {
            ResourceConfig::Shell(shell) => shell.validate(),
        }
    }
}

/// Configuration for a shell-command-backed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellResourceConfig {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub command: String,

    /// Relative paths resolve against the test context's workspace root.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,

    #[serde(default = "default_shell_timeout")]
    pub timeout_seconds: u64,

    /// Maximum characters of output kept in a failed result.
    #[serde(default = "default_crop_output")]
    pub crop_output: usize,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ShellResourceConfig {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            command: command.into(),
            working_directory: None,
            timeout_seconds: DEFAULT_SHELL_TIMEOUT_SECS,
            crop_output: DEFAULT_CROP_OUTPUT,
            env: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_resource_name(&self.name)?;
        if self.command.trim().is_empty() {
            return Err(TestLoopError::Configuration(format!(
                "shell resource {} has empty command",
                self.name
            )));
        }
        Ok(())
    }
}

/// Resource names are non-empty and contain no whitespace, so a selector
/// can list several of them separated by spaces.
pub fn check_resource_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TestLoopError::Configuration(
            "resource name must not be empty".to_string(),
        ));
    }
    if name.contains(char::is_whitespace) {
        return Err(TestLoopError::Configuration(format!(
            "resource name must not contain whitespace: {name:?}"
        )));
    }
    Ok(())
}

impl TestingConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: TestingConfig = toml::from_str(raw)
            .map_err(|e| TestLoopError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TestLoopError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Fail fast on duplicate names or missing required fields.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &self.resources {
            resource.validate()?;
            if !seen.insert(resource.name()) {
                return Err(TestLoopError::Configuration(format!(
                    "duplicate resource name: {}",
                    resource.name()
                )));
            }
        }
        Ok(())
    }
}

fn default_max_auto_repairs() -> u32 {
    DEFAULT_MAX_AUTO_REPAIRS
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

fn default_shell_timeout() -> u64 {
    DEFAULT_SHELL_TIMEOUT_SECS
}

fn default_crop_output() -> usize {
    DEFAULT_CROP_OUTPUT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TestingConfig::from_toml_str("").expect("parse");
        assert_eq!(config.agent_defaults.max_auto_repairs, 5);
        assert_eq!(config.repair.confirmation_timeout_seconds, 30);
        assert!(config.repair.command.is_none());
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_shell_resource_defaults() {
        let raw = r#"
            [[resources]]
            type = "shell"
            name = "unit"
            command = "cargo test"
        "#;
        let config = TestingConfig::from_toml_str(raw).expect("parse");
        let ResourceConfig::Shell(shell) = &config.resources[0];
        assert_eq!(shell.timeout_seconds, 120);
        assert_eq!(shell.crop_output, 10_000);
        assert!(shell.working_directory.is_none());
        assert!(shell.env.is_empty());
    }

    #[test]
    fn test_resources_keep_declaration_order() {
        let raw = r#"
            [agent_defaults]
            max_auto_repairs = 2

            [[resources]]
            type = "shell"
            name = "lint"
            command = "cargo clippy"

            [[resources]]
            type = "shell"
            name = "unit"
            command = "cargo test"
            working_directory = "crates/core"
            timeout_seconds = 600
        "#;
        let config = TestingConfig::from_toml_str(raw).expect("parse");
        let names: Vec<&str> = config.resources.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["lint", "unit"]);
        assert_eq!(config.agent_defaults.max_auto_repairs, 2);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let raw = r#"
            [[resources]]
            type = "shell"
            name = "unit"
            command = "true"

            [[resources]]
            type = "shell"
            name = "unit"
            command = "false"
        "#;
        let err = TestingConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, TestLoopError::Configuration(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_empty_command_rejected() {
        let raw = r#"
            [[resources]]
            type = "shell"
            name = "unit"
            command = "   "
        "#;
        let err = TestingConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, TestLoopError::Configuration(_)));
    }

    #[test]
    fn test_padded_name_rejected() {
        let raw = r#"
            [[resources]]
            type = "shell"
            name = " unit"
            command = "true"
        "#;
        let err = TestingConfig::from_toml_str(raw).unwrap_err();
        assert!(matches!(err, TestLoopError::Configuration(ref m) if m.contains("whitespace")));
    }

    #[test]
    fn test_unknown_resource_type_rejected() {
        let raw = r#"
            [[resources]]
            type = "docker"
            name = "unit"
            command = "true"
        "#;
        assert!(TestingConfig::from_toml_str(raw).is_err());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(TestingConfig::from_toml_str("max_auto_repairs = 3").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("testloop.toml");
        std::fs::write(&path, "[repair]\ncommand = \"agent --stdin\"\n").expect("write");
        let config = TestingConfig::load(&path).expect("load");
        assert_eq!(config.repair.command.as_deref(), Some("agent --stdin"));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let err = TestingConfig::load(Path::new("/nonexistent/testloop.toml")).unwrap_err();
        assert!(matches!(err, TestLoopError::Configuration(_)));
    }
}
