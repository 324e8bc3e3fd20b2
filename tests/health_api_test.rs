//! Health API integration tests

use crate::common::{TestApp, TestRequest};
use axum::http::StatusCode;

mod common;

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let response = TestRequest::get("/health").send(&app.router).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "healthy");
}

#[tokio::test]
async fn test_health_is_not_rate_limited() {
    let app = TestApp::new();

    for _ in 0..5 {
        let response = TestRequest::get("/health").send(&app.router).await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_request_id_is_returned() {
    let app = TestApp::new();

    let response = TestRequest::get("/health").send(&app.router).await;

    assert!(response.header("x-request-id").is_some());
}

#[tokio::test]
async fn test_metrics_route_absent_without_recorder() {
    let app = TestApp::new();

    let response = TestRequest::get("/metrics").send(&app.router).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}
