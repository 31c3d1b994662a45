use super::*;
use crate::middleware::Middleware;
use crate::modules::gateway::handlers::{BodyLimitFactory, CorsFactory, TraceFactory};
use serde_json::json;

fn test_service() -> Arc<GatewayService> {
    let service = Arc::new(GatewayService::new());
    service
        .with_stack(|stack| {
            stack
                .push(Middleware::new("trace", Arc::new(TraceFactory)))?
                .push(Middleware::new("cors", Arc::new(CorsFactory)))?
                .push(
                    Middleware::new("body-limit", Arc::new(BodyLimitFactory))
                        .with_params(json!({ "limitBytes": 8 })),
                )?;
            Ok::<(), crate::error::StackError>(())
        })
        .unwrap();
    service.finalize().unwrap();
    service
}

#[tokio::test]
async fn test_health_answers_outside_the_pipeline() {
    let routes = routes(test_service());

    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 200);
    assert!(!response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unmatched_request_gets_default_not_found() {
    let routes = routes(test_service());

    let response = warp::test::request()
        .method("GET")
        .path("/nope")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 404);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_oversized_body_is_halted_by_the_pipeline() {
    let routes = routes(test_service());

    let response = warp::test::request()
        .method("POST")
        .path("/submit")
        .body("way past the configured limit")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 413);
}

#[tokio::test]
async fn test_preflight_is_answered_by_cors_stage() {
    let routes = routes(test_service());

    let response = warp::test::request()
        .method("OPTIONS")
        .path("/anything")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), 204);
    assert!(response
        .headers()
        .contains_key("access-control-allow-methods"));
}
