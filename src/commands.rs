use crate::app;
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::modules::gateway::{self, GatewayService};
use std::sync::Arc;
use tracing::info;

/// Validates the configuration, assembles the application without serving
/// traffic, and prints the resulting module and middleware plan.
pub async fn run_config_check(config: Config) -> Result<()> {
    crate::config::validate(&config)?;
    info!("✓ Configuration is valid");

    let echo = serde_yaml::to_string(&config)
        .map_err(|e| ConfigError::Parse(e.to_string()))?;
    println!("Effective configuration:\n{echo}");

    let app = app::assemble(config).await?;

    println!("Modules (load order):");
    for name in app.manager.load_order() {
        let dependencies = app
            .manager
            .get(name)
            .map(|module| module.dependencies())
            .unwrap_or_default();
        if dependencies.is_empty() {
            println!("  {name}");
        } else {
            println!("  {name} (depends on: {})", dependencies.join(", "));
        }
    }

    let service: Arc<GatewayService> = app
        .state
        .registry
        .get(gateway::SERVICE_KEY)?;

    println!("Middleware pipeline:");
    for (id, enabled) in service.stack_snapshot() {
        let marker = if enabled { "+" } else { "-" };
        println!("  [{marker}] {id}");
    }

    Ok(())
}
