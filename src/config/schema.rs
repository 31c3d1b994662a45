use crate::middleware::Pivot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-stage overrides for the middleware pipeline, keyed by stage id.
    #[serde(default)]
    pub middlewares: HashMap<String, MiddlewareConfig>,

    /// Opaque per-module configuration tables, keyed by module name.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Grace period granted to in-flight requests on shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

/// Assembly-time tuning of one pipeline stage.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Stage params, handed to the handler factory. Null keeps the stage's
    /// current params.
    #[serde(default)]
    pub params: serde_json::Value,

    /// Optional repositioning of the stage relative to another stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<Pivot>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            params: serde_json::Value::Null,
            pivot: None,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_shutdown_grace() -> u64 {
    5000
}

pub(crate) fn default_enabled() -> bool {
    true
}
