//! Plugin-module system.
//!
//! Applications are composed from modules: units of wiring that declare a
//! name, the modules they depend on, and default configuration. The
//! [`ModuleManager`] resolves dependency order, drives the two lifecycle
//! phases (`initialize`, then `setup` in dependency order) and dispatches
//! named hooks sequentially across modules. Modules exchange capabilities
//! through the shared [`Registry`].

pub mod manager;
pub mod registry;

pub use manager::{ModuleManager, SHUTDOWN_HOOK};
pub use registry::Registry;

use crate::config::Config;
use crate::error::ModuleError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Context handed to a module during lifecycle phases.
pub struct ModuleCtx {
    /// This module's configuration: its defaults deep-merged under the
    /// application config's `modules.<name>` table.
    pub config: Value,
    pub registry: Arc<Registry>,
    /// Read-only snapshot of the full application configuration.
    pub app_config: Arc<Config>,
}

impl ModuleCtx {
    /// Deserializes the merged module configuration into a typed struct.
    pub fn config_as<T: DeserializeOwned>(&self, module: &str) -> Result<T, ModuleError> {
        serde_json::from_value(self.config.clone()).map_err(|e| ModuleError::InvalidConfig {
            module: module.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Named values accumulated while a hook travels across modules.
#[derive(Debug, Default)]
pub struct HookContext {
    values: HashMap<String, Value>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn into_values(self) -> HashMap<String, Value> {
        self.values
    }
}

/// A pluggable unit of application wiring.
#[async_trait]
pub trait Module: Send + Sync {
    /// Unique name used for registration, dependency edges and the
    /// `modules.<name>` configuration table.
    fn name(&self) -> &'static str;

    /// Modules that must finish `setup` before this one runs.
    fn dependencies(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Defaults merged underneath the application-provided module config.
    fn default_config(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Early validation pass; runs for every module before any `setup`.
    async fn initialize(&self, _ctx: &ModuleCtx) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Main wiring phase, run in dependency order.
    async fn setup(&self, ctx: &ModuleCtx) -> Result<(), ModuleError>;

    /// Named hook dispatch; modules receive each hook sequentially in load
    /// order and may read or extend the shared context.
    async fn on_hook(&self, _hook: &str, _ctx: &mut HookContext) -> Result<(), ModuleError> {
        Ok(())
    }
}
