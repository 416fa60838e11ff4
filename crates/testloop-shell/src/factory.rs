//! Map resource configuration to concrete resources.

use std::sync::Arc;

use tracing::info;

use testloop_core::{ResourceConfig, ResourceRegistry, Result, TestResource, TestingConfig};

use crate::shell::ShellCommandResource;

/// Construct the resource for one configuration entry.
pub fn build_resource(config: &ResourceConfig) -> Result<Arc<dyn TestResource>> {
    match config {
        ResourceConfig::Shell(shell) => Ok(Arc::new(ShellCommandResource::new(shell.clone())?)),
    }
}

/// Validate `config` and register every resource it declares, in order.
///
/// Returns the number of resources registered. Nothing is registered when
/// validation fails.
pub fn install_resources(registry: &mut ResourceRegistry, config: &TestingConfig) -> Result<usize> {
    config.validate()?;
    for resource in &config.resources {
        registry.register(resource.name(), build_resource(resource)?)?;
    }
    info!(count = config.resources.len(), "installed test resources");
    Ok(config.resources.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testloop_core::{ShellResourceConfig, TestLoopError};

    #[test]
    fn test_install_in_declaration_order() {
        let config = TestingConfig::from_toml_str(
            r#"
            [[resources]]
            type = "shell"
            name = "unit"
            command = "cargo test"

            [[resources]]
            type = "shell"
            name = "lint"
            command = "cargo clippy"
            description = "clippy lints"
            "#,
        )
        .unwrap();

        let mut registry = ResourceRegistry::new();
        assert_eq!(install_resources(&mut registry, &config).unwrap(), 2);
        assert_eq!(registry.names(), vec!["unit", "lint"]);
        assert_eq!(registry.get("lint").unwrap().description(), "clippy lints");
    }

    #[test]
    fn test_invalid_config_registers_nothing() {
        let mut config = TestingConfig::default();
        config
            .resources
            .push(ResourceConfig::Shell(ShellResourceConfig::new("unit", "true")));
        config
            .resources
            .push(ResourceConfig::Shell(ShellResourceConfig::new("unit", "false")));

        let mut registry = ResourceRegistry::new();
        let err = install_resources(&mut registry, &config).unwrap_err();
        assert!(matches!(err, TestLoopError::Configuration(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_name_clash_with_existing_registration() {
        let mut registry = ResourceRegistry::new();
        registry
            .register(
                "unit",
                build_resource(&ResourceConfig::Shell(ShellResourceConfig::new("unit", "true")))
                    .unwrap(),
            )
            .unwrap();

        let mut config = TestingConfig::default();
        config
            .resources
            .push(ResourceConfig::Shell(ShellResourceConfig::new("unit", "true")));
        assert!(install_resources(&mut registry, &config).is_err());
        assert_eq!(registry.len(), 1);
    }
}
