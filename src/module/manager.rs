//! Module registration, dependency resolution and lifecycle.

use crate::config::Config;
use crate::error::ModuleError;
use crate::module::{HookContext, Module, ModuleCtx, Registry};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Hook dispatched in reverse load order when the application stops.
pub const SHUTDOWN_HOOK: &str = "shutdown";

/// Owns the registered modules and drives their lifecycle.
pub struct ModuleManager {
    modules: Vec<Arc<dyn Module>>,
    index: HashMap<String, usize>,
    registry: Arc<Registry>,
    load_order: Vec<usize>,
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field(
                "modules",
                &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("index", &self.index)
            .field("load_order", &self.load_order)
            .finish()
    }
}

impl Default for ModuleManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleManager {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            index: HashMap::new(),
            registry: Arc::new(Registry::new()),
            load_order: Vec::new(),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Registers a module. Names are unique across the application.
    pub fn register(&mut self, module: Arc<dyn Module>) -> Result<&mut Self, ModuleError> {
        let name = module.name().to_string();
        if self.index.contains_key(&name) {
            return Err(ModuleError::Duplicate(name));
        }
        self.index.insert(name, self.modules.len());
        self.modules.push(module);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.index.get(name).map(|&i| self.modules[i].clone())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Module names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Module names in resolved load order. Empty before [`load`] ran.
    ///
    /// [`load`]: ModuleManager::load
    pub fn load_order(&self) -> Vec<&'static str> {
        self.load_order
            .iter()
            .map(|&i| self.modules[i].name())
            .collect()
    }

    /// Runs the full lifecycle: dependency resolution, then every module's
    /// `initialize` in registration order, then `setup` in dependency
    /// order.
    pub async fn load(&mut self, config: Arc<Config>) -> Result<(), ModuleError> {
        let order = self.resolve_order()?;

        for module in &self.modules {
            let ctx = self.ctx_for(module.as_ref(), &config);
            debug!(module = module.name(), "initializing module");
            module.initialize(&ctx).await?;
        }

        for &i in &order {
            let module = &self.modules[i];
            let ctx = self.ctx_for(module.as_ref(), &config);
            debug!(module = module.name(), "setting up module");
            module.setup(&ctx).await?;
        }

        self.load_order = order;
        info!(
            modules = ?self.load_order(),
            "loaded {} module(s)",
            self.modules.len()
        );
        Ok(())
    }

    /// Dispatches a named hook sequentially across modules in load order.
    pub async fn run_hook(
        &self,
        hook: &str,
        ctx: &mut HookContext,
    ) -> Result<(), ModuleError> {
        debug!(hook, "running hook");
        for &i in &self.dispatch_order() {
            self.modules[i].on_hook(hook, ctx).await?;
        }
        Ok(())
    }

    /// Dispatches the shutdown hook in reverse load order. Best-effort:
    /// a failing module is logged and the remaining modules still run.
    pub async fn shutdown(&self) {
        let mut ctx = HookContext::new();
        for &i in self.dispatch_order().iter().rev() {
            let module = &self.modules[i];
            if let Err(e) = module.on_hook(SHUTDOWN_HOOK, &mut ctx).await {
                error!(module = module.name(), error = %e, "shutdown hook failed");
            }
        }
        info!("modules shut down");
    }

    fn dispatch_order(&self) -> Vec<usize> {
        if self.load_order.is_empty() {
            (0..self.modules.len()).collect()
        } else {
            self.load_order.clone()
        }
    }

    fn ctx_for(&self, module: &dyn Module, config: &Arc<Config>) -> ModuleCtx {
        let supplied = config
            .modules
            .get(module.name())
            .cloned()
            .unwrap_or(Value::Object(Map::new()));
        ModuleCtx {
            config: merge_values(module.default_config(), supplied),
            registry: self.registry.clone(),
            app_config: config.clone(),
        }
    }

    /// Depth-first topological sort over dependency edges.
    fn resolve_order(&self) -> Result<Vec<usize>, ModuleError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        fn visit(
            idx: usize,
            modules: &[Arc<dyn Module>],
            index: &HashMap<String, usize>,
            marks: &mut [Mark],
            order: &mut Vec<usize>,
        ) -> Result<(), ModuleError> {
            match marks[idx] {
                Mark::Done => return Ok(()),
                Mark::Visiting => {
                    return Err(ModuleError::CircularDependency(
                        modules[idx].name().to_string(),
                    ))
                }
                Mark::Unvisited => {}
            }

            marks[idx] = Mark::Visiting;
            for dependency in modules[idx].dependencies() {
                let &dep_idx =
                    index
                        .get(dependency)
                        .ok_or_else(|| ModuleError::MissingDependency {
                            module: modules[idx].name().to_string(),
                            dependency: dependency.to_string(),
                        })?;
                visit(dep_idx, modules, index, marks, order)?;
            }
            marks[idx] = Mark::Done;
            order.push(idx);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.modules.len()];
        let mut order = Vec::with_capacity(self.modules.len());
        for idx in 0..self.modules.len() {
            visit(idx, &self.modules, &self.index, &mut marks, &mut order)?;
        }
        Ok(order)
    }
}

/// Deep merge of JSON values: objects merge key-wise, a null overlay keeps
/// the base, anything else overrides.
fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}
