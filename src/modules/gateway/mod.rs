//! Gateway module.
//!
//! Owns the middleware stack other modules mount stages into, and the
//! frozen chain snapshot the HTTP server executes per request. The module
//! publishes a [`GatewayService`] in the registry under [`SERVICE_KEY`];
//! dependent modules fetch it during their own setup to insert middleware
//! at pivot positions.

pub mod handlers;

use crate::config::MiddlewareConfig;
use crate::error::{ModuleError, StackError, WeftError};
use crate::middleware::{
    Middleware, MiddlewareChain, MiddlewareStack, Responder,
};
use crate::module::{HookContext, Module, ModuleCtx};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Registry key the gateway service is published under.
pub const SERVICE_KEY: &str = "gateway";

/// Hook dispatched once at assembly; modules contribute values that every
/// request context can read through `ctx.shared`.
pub const BUILD_CONTEXT_HOOK: &str = "gateway.buildContext";

/// Shared gateway state: the mutable stack used during assembly and the
/// immutable chain snapshot served to requests.
pub struct GatewayService {
    stack: Mutex<MiddlewareStack>,
    chain: ArcSwap<MiddlewareChain>,
    responder: RwLock<Arc<dyn Responder>>,
    shared: RwLock<Arc<HashMap<String, Value>>>,
}

impl Default for GatewayService {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayService {
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(MiddlewareStack::new()),
            chain: ArcSwap::from_pointee(MiddlewareChain::empty()),
            responder: RwLock::new(Arc::new(handlers::NotFoundResponder)),
            shared: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Runs `f` against the middleware stack under the assembly lock.
    pub fn with_stack<T, E>(
        &self,
        f: impl FnOnce(&mut MiddlewareStack) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let mut stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut stack)
    }

    /// Stage ids and enabled flags in current stack order.
    pub fn stack_snapshot(&self) -> Vec<(String, bool)> {
        let stack = self.stack.lock().unwrap_or_else(|e| e.into_inner());
        stack
            .iter()
            .map(|item| (item.id.clone(), item.enabled))
            .collect()
    }

    /// Applies per-stage configuration overrides: enabled flag, params and
    /// optional repositioning. Stages are processed in sorted id order so
    /// the outcome does not depend on map iteration order.
    pub fn apply_middleware_config(
        &self,
        overrides: &HashMap<String, MiddlewareConfig>,
    ) -> std::result::Result<(), StackError> {
        let mut ids: Vec<&String> = overrides.keys().collect();
        ids.sort();

        self.with_stack(|stack| {
            for id in ids {
                let conf = &overrides[id];
                stack.config(id, |mut item| {
                    item.enabled = conf.enabled;
                    if !conf.params.is_null() {
                        item.params = conf.params.clone();
                    }
                    item
                })?;
                if let Some(pivot) = &conf.pivot {
                    stack.move_to(id, pivot)?;
                }
            }
            Ok(())
        })
    }

    /// Freezes the current stack into the chain snapshot served to
    /// requests.
    pub fn finalize(&self) -> std::result::Result<(), WeftError> {
        let chain = self.with_stack(|stack| MiddlewareChain::from_stack(stack))?;
        debug!(stages = ?chain.ids(), "middleware chain finalized");
        self.chain.store(Arc::new(chain));
        Ok(())
    }

    pub fn chain(&self) -> Arc<MiddlewareChain> {
        self.chain.load_full()
    }

    pub fn set_responder(&self, responder: Arc<dyn Responder>) {
        let mut slot = self.responder.write().unwrap_or_else(|e| e.into_inner());
        *slot = responder;
    }

    pub fn responder(&self) -> Arc<dyn Responder> {
        self.responder
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_shared(&self, values: HashMap<String, Value>) {
        let mut slot = self.shared.write().unwrap_or_else(|e| e.into_inner());
        *slot = Arc::new(values);
    }

    pub fn shared(&self) -> Arc<HashMap<String, Value>> {
        self.shared
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Builds the base pipeline and publishes the gateway service.
pub struct GatewayModule;

#[async_trait]
impl Module for GatewayModule {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn setup(&self, ctx: &ModuleCtx) -> Result<(), ModuleError> {
        let service = Arc::new(GatewayService::new());

        service
            .with_stack(|stack| {
                stack
                    .push(Middleware::new("trace", Arc::new(handlers::TraceFactory)))?
                    .push(Middleware::new("cors", Arc::new(handlers::CorsFactory)))?
                    .push(Middleware::new(
                        "body-limit",
                        Arc::new(handlers::BodyLimitFactory),
                    ))?;
                Ok(())
            })
            .map_err(|e: StackError| ModuleError::SetupFailed {
                module: self.name().to_string(),
                reason: e.to_string(),
            })?;

        ctx.registry.publish(SERVICE_KEY, service);
        Ok(())
    }

    async fn on_hook(&self, hook: &str, ctx: &mut HookContext) -> Result<(), ModuleError> {
        if hook == BUILD_CONTEXT_HOOK {
            ctx.insert(
                "gateway",
                json!({
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                }),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::middleware::Pivot;
    use crate::module::Registry;

    fn ctx() -> ModuleCtx {
        ModuleCtx {
            config: json!({}),
            registry: Arc::new(Registry::new()),
            app_config: Arc::new(Config::default()),
        }
    }

    #[tokio::test]
    async fn test_setup_publishes_service_with_base_stack() {
        let ctx = ctx();
        GatewayModule.setup(&ctx).await.unwrap();

        let service: Arc<GatewayService> = ctx.registry.get(SERVICE_KEY).unwrap();
        let ids: Vec<String> = service
            .stack_snapshot()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["trace", "cors", "body-limit"]);
    }

    #[tokio::test]
    async fn test_overrides_disable_and_reposition_stages() {
        let ctx = ctx();
        GatewayModule.setup(&ctx).await.unwrap();
        let service: Arc<GatewayService> = ctx.registry.get(SERVICE_KEY).unwrap();

        let mut overrides = HashMap::new();
        overrides.insert(
            "cors".to_string(),
            MiddlewareConfig {
                enabled: false,
                ..Default::default()
            },
        );
        overrides.insert(
            "body-limit".to_string(),
            MiddlewareConfig {
                pivot: Some(Pivot::before("trace")),
                ..Default::default()
            },
        );

        service.apply_middleware_config(&overrides).unwrap();

        assert_eq!(
            service.stack_snapshot(),
            vec![
                ("body-limit".to_string(), true),
                ("trace".to_string(), true),
                ("cors".to_string(), false),
            ]
        );

        service.finalize().unwrap();
        assert_eq!(service.chain().ids(), vec!["body-limit", "trace"]);
    }

    #[tokio::test]
    async fn test_override_for_unknown_stage_fails() {
        let ctx = ctx();
        GatewayModule.setup(&ctx).await.unwrap();
        let service: Arc<GatewayService> = ctx.registry.get(SERVICE_KEY).unwrap();

        let mut overrides = HashMap::new();
        overrides.insert("ghost".to_string(), MiddlewareConfig::default());

        let err = service.apply_middleware_config(&overrides).unwrap_err();
        assert_eq!(err, StackError::ItemNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_build_context_hook_contributes_gateway_info() {
        let mut hook_ctx = HookContext::new();
        GatewayModule
            .on_hook(BUILD_CONTEXT_HOOK, &mut hook_ctx)
            .await
            .unwrap();

        let info = hook_ctx.get("gateway").unwrap();
        assert_eq!(info["name"], "weft");
    }
}
