//! Testloop CLI
//!
//! The `testloop` command runs configured test resources and offers to hand
//! failures to an AI repair agent.
//!
//! ## Commands
//!
//! - `list`: Show registered test resources
//! - `run`: Run tests and ask before repairing failures
//! - `repair`: Run tests and repair failures without asking; lists the
//!   available tests when no selector is given
//! - `status`: Show the latest results and the repair counter

mod console;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use testloop_core::{
    Collaborators, ControllerConfig, CycleOutcome, CycleRequest, ModifyScope, RepairDispatch,
    RepairLoopController, ResourceRegistry, SessionStateStore, TestContext, TestingConfig,
};
use testloop_core::telemetry::{self, LogFormat};
use testloop_shell::install_resources;

use console::{ConsoleReporter, TerminalApprover};
use session::CommandSession;

#[derive(Parser, Debug)]
#[command(name = "testloop")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run tests and repair failures with an AI agent", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Path to the testing configuration
    #[arg(long, global = true, env = "TESTLOOP_CONFIG", default_value = "testloop.toml")]
    config: PathBuf,

    /// Where session state is loaded from and saved to
    #[arg(long, global = true, default_value = ".testloop/state.json")]
    state_file: PathBuf,

    /// Root that relative working directories resolve against
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered test resources
    List,

    /// Run tests matching the selectors and offer to repair failures
    Run {
        /// Resource names, globs (`unit-*`), or substrings; none or `all` runs everything
        selectors: Vec<String>,
    },

    /// Run tests matching the selectors and repair failures without asking
    Repair {
        /// What the agent may change: code, test, or either
        #[arg(long, default_value = "either")]
        modify: String,

        /// Resource names, globs (`unit-*`), or substrings; `all` runs everything
        selectors: Vec<String>,
    },

    /// Show the latest results and the repair counter
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    telemetry::init_tracing(LogFormat::from_json_flag(cli.json), level);

    let config = TestingConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {:?}", cli.config))?;

    match cli.command {
        Commands::List => cmd_list(&config),
        Commands::Run { ref selectors } => {
            cmd_cycle(&cli, &config, CycleRequest::run(selector_of(selectors))).await
        }
        Commands::Repair {
            ref modify,
            ref selectors,
        } => {
            let modify: ModifyScope = modify.parse()?;
            if selectors.is_empty() {
                return cmd_list(&config);
            }
            cmd_cycle(&cli, &config, CycleRequest::repair(selector_of(selectors), modify)).await
        }
        Commands::Status => cmd_status(&config, &cli.state_file),
    }
}

/// Join command-line selectors into one registry selector; none means everything.
fn selector_of(selectors: &[String]) -> String {
    if selectors.is_empty() {
        "*".to_string()
    } else {
        selectors.join(" ")
    }
}

/// List registered test resources
fn cmd_list(config: &TestingConfig) -> Result<()> {
    let mut registry = ResourceRegistry::new();
    install_resources(&mut registry, config)?;

    if registry.is_empty() {
        println!("No tests available.");
        return Ok(());
    }

    println!("Available tests:");
    for name in registry.names() {
        let description = registry
            .get(&name)
            .map(|resource| resource.description().to_string())
            .unwrap_or_default();
        println!("  {:<20} {}", name, description);
    }
    Ok(())
}

/// Run one repair cycle and persist the session state
async fn cmd_cycle(cli: &Cli, config: &TestingConfig, request: CycleRequest) -> Result<()> {
    let mut registry = ResourceRegistry::new();
    install_resources(&mut registry, config)?;

    let store = Arc::new(load_state(&cli.state_file, config)?);
    let collaborators = Collaborators::new()
        .with_reporter(Arc::new(ConsoleReporter::new(cli.verbose)))
        .with_approver(Arc::new(
            TerminalApprover::stdin().context("Failed to start the stdin reader")?,
        ))
        .with_session(Arc::new(CommandSession::new(
            config.repair.command.clone(),
            &cli.workspace,
        )));
    let controller = RepairLoopController::with_config(
        registry,
        collaborators,
        store.clone(),
        TestContext::new(&cli.workspace),
        ControllerConfig::from(config),
    );

    let outcome = controller.run_cycle(request).await?;
    save_state(&cli.state_file, &store)?;

    if let Some(summary) = outcome.summary() {
        println!("{summary}");
    }
    match outcome {
        CycleOutcome::NoTestsMatched | CycleOutcome::AllPassed { .. } => Ok(()),
        CycleOutcome::Declined { .. } => anyhow::bail!("Tests failed; repair declined"),
        CycleOutcome::TimedOut { .. } => anyhow::bail!("Tests failed; repair prompt timed out"),
        CycleOutcome::Repaired {
            dispatch: RepairDispatch::Completed,
            ..
        } => {
            println!("✓ Repair finished; run the tests again to verify");
            Ok(())
        }
        CycleOutcome::Repaired {
            dispatch: RepairDispatch::Failed { reason },
            ..
        } => anyhow::bail!("Repair failed: {reason}"),
    }
}

/// Show the latest results and the repair counter
fn cmd_status(config: &TestingConfig, state_file: &Path) -> Result<()> {
    let store = load_state(state_file, config)?;
    for line in store.snapshot().show() {
        println!("{line}");
    }
    Ok(())
}

/// Load the session state, or start fresh from the configured defaults.
///
/// The auto-repair ceiling always follows the current configuration.
fn load_state(path: &Path, config: &TestingConfig) -> Result<SessionStateStore> {
    if !path.exists() {
        return Ok(SessionStateStore::initialize(&config.agent_defaults));
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file {:?}", path))?;
    let store = SessionStateStore::deserialize(&raw)
        .with_context(|| format!("State file {:?} is not valid session state", path))?;
    store.mutate(|state| state.max_auto_repairs = config.agent_defaults.max_auto_repairs);
    Ok(store)
}

fn save_state(path: &Path, store: &SessionStateStore) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(path, store.serialize()?)
        .with_context(|| format!("Failed to write state file {:?}", path))?;
    info!(path = %path.display(), "saved session state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use testloop_core::{AgentDefaults, TestResult};

    #[test]
    fn test_parse_run_defaults_to_everything() {
        let cli = Cli::try_parse_from(["testloop", "run"]).unwrap();
        match cli.command {
            Commands::Run { selectors } => assert_eq!(selector_of(&selectors), "*"),
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.state_file, PathBuf::from(".testloop/state.json"));
    }

    #[test]
    fn test_parse_repair_with_modify() {
        let cli = Cli::try_parse_from([
            "testloop", "repair", "--modify", "code", "unit-*", "lint",
        ])
        .unwrap();
        match cli.command {
            Commands::Repair { modify, selectors } => {
                assert_eq!(modify.parse::<ModifyScope>().unwrap(), ModifyScope::Code);
                assert_eq!(selector_of(&selectors), "unit-* lint");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_repair_without_selectors() {
        let cli = Cli::try_parse_from(["testloop", "repair"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Repair { ref selectors, .. } if selectors.is_empty()
        ));
    }

    #[test]
    fn test_state_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state.json");
        let mut config = TestingConfig::default();

        let fresh = load_state(&path, &config).unwrap();
        assert_eq!(fresh.snapshot().repair_count, 0);

        fresh.mutate(|state| {
            let now = Utc::now();
            state
                .test_results
                .insert("unit".into(), TestResult::failed(now, now, "boom"));
            state.repair_count = 3;
        });
        save_state(&path, &fresh).unwrap();

        config.agent_defaults = AgentDefaults {
            max_auto_repairs: 9,
        };
        let loaded = load_state(&path, &config).unwrap();
        let state = loaded.snapshot();
        assert_eq!(state.repair_count, 3);
        assert_eq!(state.max_auto_repairs, 9);
        assert!(state.test_results.contains_key("unit"));
    }

    #[test]
    fn test_corrupt_state_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{").unwrap();
        let err = load_state(&path, &TestingConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not valid session state"));
    }
}
