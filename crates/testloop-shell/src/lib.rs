//! Shell-command test resources for testloop.
//!
//! Provides:
//! - `ShellCommandResource`: runs `sh -c <command>` and maps the exit status
//!   to a `TestResult`
//! - `install_resources`: registers every configured resource

pub mod factory;
pub mod shell;

pub use factory::{build_resource, install_resources};
pub use shell::ShellCommandResource;
