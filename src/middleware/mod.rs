//! Middleware pipeline primitives.
//!
//! A [`MiddlewareStack`] holds uniquely-identified stages in execution
//! order and supports id-relative insertion, removal and repositioning
//! through [`Pivot`] references. At assembly time the stack is frozen into
//! a [`MiddlewareChain`] which instantiates each stage's handler from its
//! factory and executes them sequentially per request.
//!
//! # Modules
//!
//! - `stack`: the ordered named-item list and its mutation operations
//! - `pivot`: tagged pivot union with the configuration wire shapes
//! - `chain`: snapshot construction and sequential request execution

pub mod chain;
pub mod pivot;
pub mod stack;

#[cfg(test)]
mod stack_tests;

pub use chain::{MiddlewareChain, Outcome};
pub use pivot::Pivot;
pub use stack::MiddlewareStack;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;
use warp::http::header::{HeaderMap, HeaderName, HeaderValue};
use warp::http::{Method, StatusCode};

/// A single request-processing stage with a unique id.
///
/// The handler is not built until the pipeline is frozen: items carry a
/// factory plus opaque params so configuration overrides applied during
/// assembly affect the handlers that actually run.
#[derive(Clone)]
pub struct Middleware {
    pub id: String,
    pub enabled: bool,
    pub params: Value,
    factory: Arc<dyn HandlerFactory>,
}

impl Middleware {
    pub fn new(id: impl Into<String>, factory: Arc<dyn HandlerFactory>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            params: Value::Null,
            factory,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn factory(&self) -> Arc<dyn HandlerFactory> {
        self.factory.clone()
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("params", &self.params)
            .finish()
    }
}

/// Builds a [`Handler`] from the stage params captured in the stack.
///
/// Implemented for plain closures so modules and tests can register stages
/// without a dedicated factory type.
pub trait HandlerFactory: Send + Sync {
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>>;
}

impl<F> HandlerFactory for F
where
    F: Fn(&Value) -> Result<Arc<dyn Handler>> + Send + Sync,
{
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>> {
        self(params)
    }
}

/// A request-processing stage.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow>;
}

/// Terminal stage producing the response once every middleware continued.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, ctx: &RequestContext) -> GatewayResponse;
}

/// Outcome of a single middleware stage.
#[derive(Debug)]
pub enum Flow {
    /// Hand the request to the next stage.
    Continue,
    /// Short-circuit the pipeline with this response.
    Halt(GatewayResponse),
}

/// Per-request state threaded through the pipeline.
pub struct RequestContext {
    pub request_id: String,
    pub received_at: DateTime<Utc>,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
    /// Headers accumulated by stages, merged into the outgoing response.
    pub response_headers: HeaderMap,
    /// Values contributed by modules at assembly time.
    pub shared: Arc<HashMap<String, Value>>,
    /// Per-request scratch space for passing data between stages.
    pub locals: HashMap<String, Value>,
}

impl RequestContext {
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers: HeaderMap,
        body: Bytes,
        remote_addr: Option<SocketAddr>,
        shared: Arc<HashMap<String, Value>>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            received_at: Utc::now(),
            method,
            path: path.into(),
            headers,
            body,
            remote_addr,
            response_headers: HeaderMap::new(),
            shared,
            locals: HashMap::new(),
        }
    }

    /// First value of a request header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body_len", &self.body.len())
            .field("remote_addr", &self.remote_addr)
            .finish()
    }
}

/// Response produced by a halting stage or the terminal responder.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response.body = Bytes::from(body.into());
        response
    }

    pub fn json(status: StatusCode, value: &impl serde::Serialize) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            HeaderName::from_static("content-type"),
            HeaderValue::from_static("application/json"),
        );
        response.body = Bytes::from(serde_json::to_vec(value).unwrap_or_default());
        response
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}
