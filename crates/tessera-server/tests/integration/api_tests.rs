use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use tessera_core::credential::CredentialStatus;
use tessera_core::error::AppError;
use tessera_core::testutil::{MockBackend, page_of};

use crate::integration::common::{get_authed, post_job, setup_test_app};

async fn body_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public_and_lists_capabilities() {
    let app = setup_test_app(MockBackend::empty(), &["a"]);

    let response = app
        .router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    let capabilities = json["capabilities"].as_array().unwrap();
    assert!(capabilities.contains(&json!("twitter:searchbyquery")));
    assert!(capabilities.contains(&json!("telemetry:snapshot")));
}

#[tokio::test]
async fn unauthenticated_request_returns_401() {
    let app = setup_test_app(MockBackend::empty(), &["a"]);

    let response = app
        .router
        .oneshot(
            Request::post("/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"type":"web"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn wrong_api_key_returns_401() {
    let app = setup_test_app(MockBackend::empty(), &["a"]);

    let response = app
        .router
        .oneshot(
            Request::get("/v1/telemetry")
                .header("authorization", "Bearer wrong-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn successful_job_returns_data_and_cursor() {
    let app = setup_test_app(MockBackend::new(page_of(3, "page-2")), &["a"]);

    let response = app
        .router
        .oneshot(post_job(json!({
            "type": "twitter",
            "arguments": {"query": "rust", "max_results": 3},
            "worker_id": "w1"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
    assert_eq!(json["error"], "");
    assert_eq!(json["next_cursor"], "page-2");
    assert_eq!(app.backend.calls()[0].limit, 3);
}

#[tokio::test]
async fn validation_failure_returns_400() {
    let app = setup_test_app(MockBackend::empty(), &["a"]);

    let response = app
        .router
        .oneshot(post_job(json!({"type": "twitter", "arguments": {"query": ""}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "query is required");
    assert_eq!(json["error_kind"], "validation");
    assert!(json["data"].is_null());
    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn malformed_body_still_returns_job_result() {
    let app = setup_test_app(MockBackend::empty(), &["a"]);

    let response = app
        .router
        .oneshot(post_job(json!({"arguments": {}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().starts_with("invalid job request"));
    assert_eq!(json["next_cursor"], "");
}

#[tokio::test]
async fn rate_limit_returns_429_and_quarantines_credential() {
    let backend = MockBackend::with_error(AppError::RateLimitExceeded("HTTP 429".into()));
    let app = setup_test_app(backend, &["a", "b"]);

    let response = app
        .router
        .oneshot(post_job(json!({"type": "twitter", "arguments": {"query": "rust"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(response).await["error_kind"], "rate_limited");

    let states = app.pool.states();
    assert_eq!(states[0].status, CredentialStatus::RateLimited);
    assert_eq!(states[1].status, CredentialStatus::Available);
}

#[tokio::test]
async fn exhausted_pool_returns_503() {
    let app = setup_test_app(MockBackend::empty(), &[]);

    let response = app
        .router
        .oneshot(post_job(json!({"type": "twitter", "arguments": {"query": "rust"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error_kind"], "auth_exhausted");
}

#[tokio::test]
async fn backend_failure_returns_502() {
    let backend = MockBackend::with_error(AppError::HttpError("HTTP 500: boom".into()));
    let app = setup_test_app(backend, &["a"]);

    let response = app
        .router
        .oneshot(post_job(json!({"type": "web", "arguments": {"url": "https://example.com"}})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(response).await;
    assert_eq!(json["error_kind"], "backend");
    assert!(json["error"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn telemetry_reflects_executed_jobs() {
    let app = setup_test_app(MockBackend::new(page_of(4, "")), &["a"]);

    let response = app
        .router
        .clone()
        .oneshot(post_job(json!({
            "type": "twitter",
            "arguments": {"query": "rust"},
            "worker_id": "w1"
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.router.oneshot(get_authed("/v1/telemetry")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["stats"]["w1"]["scrapes"], 1);
    assert_eq!(json["stats"]["w1"]["returned_items"], 4);
    assert!(json["boot_time"].is_string());
    assert!(json["current_time"].is_string());
}
