//! Sequential execution of the frozen middleware pipeline.

use crate::error::Result;
use crate::middleware::{
    Flow, GatewayResponse, Handler, Middleware, MiddlewareStack, RequestContext, Responder,
};
use std::sync::Arc;
use tracing::{debug, error, info};
use warp::http::header::{HeaderName, HeaderValue};
use warp::http::StatusCode;

/// One instantiated stage of the chain.
struct Stage {
    id: String,
    handler: Arc<dyn Handler>,
}

/// Immutable pipeline snapshot taken from a [`MiddlewareStack`] at assembly
/// time. Disabled stages are dropped and every remaining stage's handler is
/// built from its factory and params, so configuration mistakes surface
/// here rather than on the first request.
#[derive(Default)]
pub struct MiddlewareChain {
    stages: Vec<Stage>,
}

/// Result of running a request through the chain.
#[derive(Debug)]
pub enum Outcome {
    /// Every stage continued; the terminal responder produced the response.
    Completed(GatewayResponse),
    /// A stage halted the pipeline with this response.
    Halted(GatewayResponse),
}

impl Outcome {
    pub fn into_response(self) -> GatewayResponse {
        match self {
            Outcome::Completed(response) | Outcome::Halted(response) => response,
        }
    }
}

impl MiddlewareChain {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Freezes the enabled stages of `stack` into an executable chain.
    pub fn from_stack(stack: &MiddlewareStack) -> Result<Self> {
        let mut stages = Vec::new();
        for item in stack.iter().filter(|item| item.enabled) {
            let handler = build_stage(item)?;
            stages.push(Stage {
                id: item.id.clone(),
                handler,
            });
        }
        Ok(Self { stages })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.id.as_str()).collect()
    }

    /// Runs the request through every stage in order, then hands it to the
    /// terminal responder. A stage error never tears down the request task:
    /// it is logged and mapped to a 500 response.
    pub async fn execute(
        &self,
        mut ctx: RequestContext,
        responder: &dyn Responder,
    ) -> Outcome {
        for stage in &self.stages {
            debug!(stage = %stage.id, "executing middleware stage");

            match stage.handler.handle(&mut ctx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Halt(response)) => {
                    info!(
                        stage = %stage.id,
                        status = %response.status,
                        "pipeline halted"
                    );
                    return Outcome::Halted(finish(response, &ctx));
                }
                Err(e) => {
                    error!(stage = %stage.id, error = %e, "middleware stage failed");
                    let response = GatewayResponse::text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error",
                    );
                    return Outcome::Halted(finish(response, &ctx));
                }
            }
        }

        let response = responder.respond(&ctx).await;
        Outcome::Completed(finish(response, &ctx))
    }
}

fn build_stage(item: &Middleware) -> Result<Arc<dyn Handler>> {
    item.factory().build(&item.params)
}

/// Merges stage-accumulated headers and the request id into the outgoing
/// response. Headers already set by the response win.
fn finish(mut response: GatewayResponse, ctx: &RequestContext) -> GatewayResponse {
    for (name, value) in &ctx.response_headers {
        if !response.headers.contains_key(name) {
            response.headers.insert(name.clone(), value.clone());
        }
    }
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response
            .headers
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}
