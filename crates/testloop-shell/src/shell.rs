//! Shell command execution as a test resource.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::{debug, warn};

use testloop_core::{crop_output, Result, ShellResourceConfig, TestContext, TestResource, TestResult};

/// Resource that passes when its shell command exits with status 0.
#[derive(Debug, Clone)]
pub struct ShellCommandResource {
    config: ShellResourceConfig,
    description: String,
}

impl ShellCommandResource {
    /// Build a resource from validated configuration.
    pub fn new(config: ShellResourceConfig) -> Result<Self> {
        config.validate()?;
        let description = config
            .description
            .clone()
            .unwrap_or_else(|| format!("Runs `{}`", config.command));
        Ok(Self {
            config,
            description,
        })
    }

    pub fn config(&self) -> &ShellResourceConfig {
        &self.config
    }

    fn command(&self, ctx: &TestContext, dir: &Path) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.config.command)
            .current_dir(dir)
            .envs(&ctx.env)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TestResource for ShellCommandResource {
    fn description(&self) -> &str {
        &self.description
    }

    async fn run_test(&self, ctx: &TestContext) -> TestResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let dir = ctx.resolve(self.config.working_directory.as_deref());

        let child = match self.command(ctx, &dir).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(resource = %self.config.name, error = %e, "failed to spawn test command");
                return TestResult::error(
                    started_at,
                    Utc::now(),
                    format!(
                        "failed to start `{}` in {}: {e}",
                        self.config.command,
                        dir.display()
                    ),
                );
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = if self.config.timeout_seconds > 0 {
            match tokio::time::timeout(
                Duration::from_secs(self.config.timeout_seconds),
                child.wait_with_output(),
            )
            .await
            {
                Ok(waited) => waited,
                Err(_) => {
                    warn!(
                        resource = %self.config.name,
                        timeout_seconds = self.config.timeout_seconds,
                        "test command timed out"
                    );
                    return TestResult::timeout(started_at, Utc::now());
                }
            }
        } else {
            child.wait_with_output().await
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                return TestResult::error(
                    started_at,
                    Utc::now(),
                    format!("failed to collect output of `{}`: {e}", self.config.command),
                );
            }
        };
        let finished_at = Utc::now();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = crop_output(
            &format!(
                "Running {} in {}:\n{}\n{}",
                self.config.command,
                dir.display(),
                stdout,
                stderr
            ),
            self.config.crop_output,
        );

        debug!(
            resource = %self.config.name,
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = start.elapsed().as_millis() as u64,
            "test command finished"
        );

        if output.status.success() {
            TestResult::passed(started_at, finished_at, Some(text))
        } else {
            TestResult::failed(started_at, finished_at, text)
        }
    }
}
