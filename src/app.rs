//! Application assembly.
//!
//! Boot order: register modules, run the lifecycle, collect the shared
//! request context from the build-context hook, apply middleware
//! configuration overrides, freeze the chain. After `assemble` returns the
//! pipeline is immutable and the server can start serving traffic.

use crate::config::Config;
use crate::error::Result;
use crate::module::{HookContext, Module, ModuleManager};
use crate::modules::gateway::{self, GatewayService};
use crate::modules::{GatewayModule, RateLimiterModule};
use crate::state::AppState;
use std::sync::Arc;

pub struct App {
    pub state: Arc<AppState>,
    pub manager: ModuleManager,
}

/// Assembles the application with the built-in module set.
pub async fn assemble(config: Config) -> Result<App> {
    assemble_with(config, Vec::new()).await
}

/// Assembles the application with additional modules registered after the
/// built-ins.
pub async fn assemble_with(
    config: Config,
    extra_modules: Vec<Arc<dyn Module>>,
) -> Result<App> {
    let mut manager = ModuleManager::new();
    manager
        .register(Arc::new(GatewayModule))?
        .register(Arc::new(RateLimiterModule))?;
    for module in extra_modules {
        manager.register(module)?;
    }

    let shared_config = Arc::new(config.clone());
    manager.load(shared_config).await?;

    let mut hook_ctx = HookContext::new();
    manager
        .run_hook(gateway::BUILD_CONTEXT_HOOK, &mut hook_ctx)
        .await?;

    let service: Arc<GatewayService> = manager.registry().get(gateway::SERVICE_KEY)?;
    service.set_shared(hook_ctx.into_values());
    service.apply_middleware_config(&config.middlewares)?;
    service.finalize()?;

    let (state, _shutdown_rx) = AppState::new(config, manager.registry());
    Ok(App { state, manager })
}
