//! Rate limiter module.
//!
//! Mounts a fixed-window rate limiting stage into the gateway pipeline at a
//! configurable pivot (by default right after `body-limit`). Requests are
//! keyed by `x-forwarded-for` or peer address and counted per window in
//! process memory; deployments needing a shared store sit behind a reverse
//! proxy doing the same job upstream.

use crate::error::{ModuleError, Result};
use crate::middleware::{Flow, GatewayResponse, Handler, HandlerFactory, Middleware, Pivot, RequestContext};
use crate::modules::gateway::{self, GatewayService};
use crate::module::{Module, ModuleCtx};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use warp::http::header::{HeaderName, HeaderValue};
use warp::http::StatusCode;

/// Stage id the limiter registers in the pipeline.
pub const MIDDLEWARE_ID: &str = "rate-limit";

/// Buckets are swept once the map grows past this many distinct keys.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimiterConfig {
    pub middleware: MiddlewareMount,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MiddlewareMount {
    pub enabled: bool,
    pub pivot: Pivot,
    pub config: RateLimitParams,
}

impl Default for MiddlewareMount {
    fn default() -> Self {
        Self {
            enabled: true,
            pivot: Pivot::after("body-limit"),
            config: RateLimitParams::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitParams {
    pub window_ms: u64,
    pub max: u32,
    pub status_code: u16,
    pub message: Option<String>,
    pub headers: bool,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            max: 60,
            status_code: 429,
            message: None,
            headers: true,
        }
    }
}

/// Inserts the rate limiting stage into the gateway pipeline.
pub struct RateLimiterModule;

#[async_trait]
impl Module for RateLimiterModule {
    fn name(&self) -> &'static str {
        "rate-limiter"
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec!["gateway"]
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(RateLimiterConfig::default()).unwrap_or_default()
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> std::result::Result<(), ModuleError> {
        let config: RateLimiterConfig = ctx.config_as(self.name())?;
        if config.middleware.config.window_ms == 0 {
            return Err(ModuleError::InvalidConfig {
                module: self.name().to_string(),
                reason: "windowMs must be greater than 0".to_string(),
            });
        }
        if config.middleware.config.max == 0 {
            return Err(ModuleError::InvalidConfig {
                module: self.name().to_string(),
                reason: "max must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    async fn setup(&self, ctx: &ModuleCtx) -> std::result::Result<(), ModuleError> {
        let config: RateLimiterConfig = ctx.config_as(self.name())?;

        if !config.middleware.enabled {
            debug!("rate limiting disabled, skipping middleware mount");
            return Ok(());
        }

        let service: Arc<GatewayService> = ctx.registry.get(gateway::SERVICE_KEY)?;
        let params = serde_json::to_value(&config.middleware.config).map_err(|e| {
            ModuleError::InvalidConfig {
                module: self.name().to_string(),
                reason: e.to_string(),
            }
        })?;

        let stage =
            Middleware::new(MIDDLEWARE_ID, Arc::new(RateLimitFactory)).with_params(params);

        service
            .with_stack(|stack| stack.insert(&config.middleware.pivot, vec![stage]).map(|_| ()))
            .map_err(|e| ModuleError::SetupFailed {
                module: self.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

pub struct RateLimitFactory;

impl HandlerFactory for RateLimitFactory {
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>> {
        let params: RateLimitParams = super::gateway::handlers::parse_params(params)?;
        Ok(Arc::new(RateLimitHandler::new(params)))
    }
}

struct Window {
    started_at: Instant,
    count: u32,
}

pub struct RateLimitHandler {
    params: RateLimitParams,
    buckets: DashMap<String, Window>,
}

impl RateLimitHandler {
    pub fn new(params: RateLimitParams) -> Self {
        Self {
            params,
            buckets: DashMap::new(),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.params.window_ms)
    }

    /// Requests are keyed by the first `x-forwarded-for` hop, falling back
    /// to the peer address.
    fn client_key(ctx: &RequestContext) -> String {
        if let Some(forwarded) = ctx.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
        ctx.remote_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn sweep(&self, now: Instant) {
        if self.buckets.len() > SWEEP_THRESHOLD {
            let window = self.window();
            self.buckets
                .retain(|_, bucket| now.duration_since(bucket.started_at) < window);
        }
    }

    fn over_limit_response(&self, retry_after: Duration) -> GatewayResponse {
        let status = StatusCode::from_u16(self.params.status_code)
            .unwrap_or(StatusCode::TOO_MANY_REQUESTS);
        let message = self
            .params
            .message
            .clone()
            .unwrap_or_else(|| "too many requests".to_string());

        let mut response = GatewayResponse::text(status, message);
        if self.params.headers {
            set_header(&mut response, "x-ratelimit-limit", &self.params.max.to_string());
            set_header(&mut response, "x-ratelimit-remaining", "0");
            set_header(
                &mut response,
                "retry-after",
                &retry_after.as_secs().max(1).to_string(),
            );
        }
        response
    }
}

fn set_header(response: &mut GatewayResponse, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers.insert(HeaderName::from_static(name), value);
    }
}

#[async_trait]
impl Handler for RateLimitHandler {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        let key = Self::client_key(ctx);
        let now = Instant::now();
        let window = self.window();

        let (count, started_at) = {
            let mut bucket = self.buckets.entry(key.clone()).or_insert(Window {
                started_at: now,
                count: 0,
            });
            if now.duration_since(bucket.started_at) >= window {
                bucket.started_at = now;
                bucket.count = 0;
            }
            bucket.count += 1;
            (bucket.count, bucket.started_at)
        };

        self.sweep(now);

        if count > self.params.max {
            debug!(key = %key, count, "rate limit exceeded");
            let retry_after = window.saturating_sub(now.duration_since(started_at));
            return Ok(Flow::Halt(self.over_limit_response(retry_after)));
        }

        Ok(Flow::Continue)
    }
}
