//! Built-in pipeline stages: access tracing, CORS and body size limits.

use crate::error::{ConfigError, Result};
use crate::middleware::{
    Flow, GatewayResponse, Handler, HandlerFactory, RequestContext, Responder,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use warp::http::header::{HeaderName, HeaderValue};
use warp::http::{Method, StatusCode};

/// Parses stage params, falling back to the stage defaults when the stack
/// item carries no params.
pub(crate) fn parse_params<T: DeserializeOwned + Default>(params: &Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone())
        .map_err(|e| ConfigError::Validation(e.to_string()).into())
}

/// Terminal responder used until a module installs its own.
pub struct NotFoundResponder;

#[async_trait]
impl Responder for NotFoundResponder {
    async fn respond(&self, _ctx: &RequestContext) -> GatewayResponse {
        GatewayResponse::json(StatusCode::NOT_FOUND, &json!({ "error": "not found" }))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceParams {
    pub log_headers: bool,
}

pub struct TraceFactory;

impl HandlerFactory for TraceFactory {
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>> {
        let params: TraceParams = parse_params(params)?;
        Ok(Arc::new(TraceHandler { params }))
    }
}

struct TraceHandler {
    params: TraceParams,
}

#[async_trait]
impl Handler for TraceHandler {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        info!(
            target: "weft::access",
            method = %ctx.method,
            path = %ctx.path,
            request_id = %ctx.request_id,
            remote = ?ctx.remote_addr,
            "request received"
        );
        if self.params.log_headers {
            debug!(target: "weft::access", headers = ?ctx.headers, "request headers");
        }
        Ok(Flow::Continue)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsParams {
    pub allow_origin: String,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
}

impl Default for CorsParams {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "DELETE".to_string(),
                "OPTIONS".to_string(),
            ],
            allow_headers: vec!["content-type".to_string(), "authorization".to_string()],
        }
    }
}

pub struct CorsFactory;

impl HandlerFactory for CorsFactory {
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>> {
        let params: CorsParams = parse_params(params)?;

        let origin = header_value(&params.allow_origin)?;
        let methods = header_value(&params.allow_methods.join(", "))?;
        let headers = header_value(&params.allow_headers.join(", "))?;

        Ok(Arc::new(CorsHandler {
            origin,
            methods,
            headers,
        }))
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ConfigError::Validation(format!("invalid header value: {e}")).into())
}

struct CorsHandler {
    origin: HeaderValue,
    methods: HeaderValue,
    headers: HeaderValue,
}

#[async_trait]
impl Handler for CorsHandler {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        ctx.response_headers.insert(
            HeaderName::from_static("access-control-allow-origin"),
            self.origin.clone(),
        );

        if ctx.method == Method::OPTIONS {
            let response = GatewayResponse::new(StatusCode::NO_CONTENT)
                .with_header(
                    HeaderName::from_static("access-control-allow-origin"),
                    self.origin.clone(),
                )
                .with_header(
                    HeaderName::from_static("access-control-allow-methods"),
                    self.methods.clone(),
                )
                .with_header(
                    HeaderName::from_static("access-control-allow-headers"),
                    self.headers.clone(),
                );
            return Ok(Flow::Halt(response));
        }

        Ok(Flow::Continue)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BodyLimitParams {
    pub limit_bytes: usize,
}

impl Default for BodyLimitParams {
    fn default() -> Self {
        Self {
            limit_bytes: 1024 * 1024,
        }
    }
}

pub struct BodyLimitFactory;

impl HandlerFactory for BodyLimitFactory {
    fn build(&self, params: &Value) -> Result<Arc<dyn Handler>> {
        let params: BodyLimitParams = parse_params(params)?;
        Ok(Arc::new(BodyLimitHandler { params }))
    }
}

struct BodyLimitHandler {
    params: BodyLimitParams,
}

#[async_trait]
impl Handler for BodyLimitHandler {
    async fn handle(&self, ctx: &mut RequestContext) -> Result<Flow> {
        if ctx.body.len() > self.params.limit_bytes {
            debug!(
                size = ctx.body.len(),
                limit = self.params.limit_bytes,
                "request body over limit"
            );
            return Ok(Flow::Halt(GatewayResponse::json(
                StatusCode::PAYLOAD_TOO_LARGE,
                &json!({ "error": "payload too large" }),
            )));
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;
    use warp::http::header::HeaderMap;

    fn request(method: Method, body: Bytes) -> RequestContext {
        RequestContext::new(
            method,
            "/test",
            HeaderMap::new(),
            body,
            None,
            Arc::new(HashMap::new()),
        )
    }

    #[tokio::test]
    async fn test_cors_preflight_halts_with_no_content() {
        let handler = CorsFactory.build(&Value::Null).unwrap();
        let mut ctx = request(Method::OPTIONS, Bytes::new());

        match handler.handle(&mut ctx).await.unwrap() {
            Flow::Halt(response) => {
                assert_eq!(response.status, StatusCode::NO_CONTENT);
                assert_eq!(
                    response.headers["access-control-allow-origin"],
                    HeaderValue::from_static("*")
                );
            }
            Flow::Continue => panic!("expected preflight to halt"),
        }
    }

    #[tokio::test]
    async fn test_cors_sets_response_header_and_continues() {
        let handler = CorsFactory
            .build(&json!({ "allowOrigin": "https://example.com" }))
            .unwrap();
        let mut ctx = request(Method::GET, Bytes::new());

        assert!(matches!(
            handler.handle(&mut ctx).await.unwrap(),
            Flow::Continue
        ));
        assert_eq!(
            ctx.response_headers["access-control-allow-origin"],
            HeaderValue::from_static("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_body_limit_halts_oversized_requests() {
        let handler = BodyLimitFactory
            .build(&json!({ "limitBytes": 4 }))
            .unwrap();

        let mut small = request(Method::POST, Bytes::from_static(b"ok"));
        assert!(matches!(
            handler.handle(&mut small).await.unwrap(),
            Flow::Continue
        ));

        let mut large = request(Method::POST, Bytes::from_static(b"too large"));
        match handler.handle(&mut large).await.unwrap() {
            Flow::Halt(response) => {
                assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE)
            }
            Flow::Continue => panic!("expected oversized body to halt"),
        }
    }

    #[test]
    fn test_bad_params_are_rejected() {
        assert!(BodyLimitFactory
            .build(&json!({ "limitBytes": "not a number" }))
            .is_err());
    }
}
