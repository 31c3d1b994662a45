//! HTTP gateway server.
//!
//! A single catch-all route captures the request into a
//! [`RequestContext`](crate::middleware::RequestContext) and runs it
//! through the frozen middleware chain. `/health` answers outside the
//! pipeline.

use crate::error::{ConfigError, Result};
use crate::middleware::RequestContext;
use crate::modules::gateway::{self, GatewayService};
use crate::state::AppState;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, warn, Instrument};
use warp::http::header::HeaderMap;
use warp::http::Method;
use warp::path::FullPath;
use warp::{Filter, Rejection, Reply};

#[cfg(test)]
mod gateway_tests;

pub async fn start(state: Arc<AppState>) -> Result<()> {
    let service: Arc<GatewayService> = state
        .registry
        .get(gateway::SERVICE_KEY)
        .map_err(crate::error::WeftError::Module)?;

    let (addr, grace_ms) = {
        let config = state.config.read().await;
        (
            format!("{}:{}", config.gateway.host, config.gateway.port),
            config.gateway.shutdown_grace_ms,
        )
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| ConfigError::Parse(format!("Invalid gateway address: {e}")))?;

    let routes = routes(service);

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let (bound, server) = warp::serve(routes).bind_with_graceful_shutdown(addr, async move {
        let _ = shutdown_rx.recv().await;
    });

    info!("gateway listening on {}", bound);
    let handle = tokio::spawn(server);

    // Wait for the shutdown signal, then give in-flight requests the
    // configured grace period to drain.
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    let _ = shutdown_rx.recv().await;

    match tokio::time::timeout(Duration::from_millis(grace_ms), handle).await {
        Ok(_) => info!("gateway stopped"),
        Err(_) => warn!("shutdown grace period elapsed with requests still in flight"),
    }

    Ok(())
}

fn routes(
    service: Arc<GatewayService>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::path("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
        }))
    });

    let pipeline = warp::any()
        .and(warp::method())
        .and(warp::path::full())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(warp::addr::remote())
        .and(with_service(service))
        .and_then(handle_request);

    health.or(pipeline)
}

fn with_service(
    service: Arc<GatewayService>,
) -> impl Filter<Extract = (Arc<GatewayService>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || service.clone())
}

async fn handle_request(
    method: Method,
    path: FullPath,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    service: Arc<GatewayService>,
) -> std::result::Result<impl Reply, Rejection> {
    let ctx = RequestContext::new(
        method,
        path.as_str(),
        headers,
        body,
        remote_addr,
        service.shared(),
    );

    let span = tracing::info_span!(
        "request",
        method = %ctx.method,
        path = %ctx.path,
        request_id = %ctx.request_id,
    );

    let chain = service.chain();
    let responder = service.responder();
    let outcome = chain
        .execute(ctx, responder.as_ref())
        .instrument(span)
        .await;

    let result = outcome.into_response();
    let mut response = warp::http::Response::new(result.body);
    *response.status_mut() = result.status;
    *response.headers_mut() = result.headers;
    Ok(response)
}
