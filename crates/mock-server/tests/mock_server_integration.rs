//! Round-trips real HTTP requests through a bound mock server.

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use berth_core::MockError;
use berth_mock::MockServer;

fn ping_router() -> Router {
    Router::new().route("/ping", get(|| async { "pong" }))
}

#[tokio::test]
async fn serves_requests_after_start() {
    let mut mock = MockServer::bind_local(ping_router()).await.unwrap();
    let base = format!("http://{}", mock.local_addr());
    mock.start().unwrap();

    let body = reqwest::get(format!("{base}/ping"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pong");

    mock.stop().await.unwrap();
}

#[tokio::test]
async fn address_is_known_before_start() {
    let mock = MockServer::bind_local(ping_router()).await.unwrap();
    assert_ne!(mock.local_addr().port(), 0);
    assert!(!mock.is_running());
}

#[tokio::test]
async fn json_routes_work() {
    let router = Router::new().route(
        "/v1/echo",
        post(|Json(body): Json<Value>| async move { Json(json!({ "echo": body })) }),
    );
    let mut mock = MockServer::bind_local(router).await.unwrap();
    let base = format!("http://{}", mock.local_addr());
    mock.start().unwrap();

    let client = reqwest::Client::new();
    let reply: Value = client
        .post(format!("{base}/v1/echo"))
        .json(&json!({ "n": 7 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply, json!({ "echo": { "n": 7 } }));

    mock.stop().await.unwrap();
}

#[tokio::test]
async fn stop_refuses_connections_afterwards() {
    let mut mock = MockServer::bind_local(ping_router()).await.unwrap();
    let base = format!("http://{}", mock.local_addr());
    mock.start().unwrap();
    mock.stop().await.unwrap();

    let result = reqwest::Client::new()
        .get(format!("{base}/ping"))
        .send()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn double_start_is_rejected() {
    let mut mock = MockServer::bind_local(ping_router()).await.unwrap();
    mock.start().unwrap();
    assert!(matches!(mock.start(), Err(MockError::AlreadyStarted)));
    mock.stop().await.unwrap();
}

#[tokio::test]
async fn start_after_stop_is_rejected_as_stopped() {
    let mut mock = MockServer::bind_local(ping_router()).await.unwrap();
    mock.start().unwrap();
    mock.stop().await.unwrap();
    assert!(matches!(mock.start(), Err(MockError::Stopped)));
}

#[tokio::test]
async fn stop_before_start_is_rejected() {
    let mut mock = MockServer::bind_local(ping_router()).await.unwrap();
    assert!(matches!(mock.stop().await, Err(MockError::NotStarted)));
}

#[tokio::test]
async fn bind_fails_on_invalid_address() {
    let err = MockServer::bind(ping_router(), "256.0.0.1:0")
        .await
        .unwrap_err();
    assert!(matches!(err, MockError::Bind { .. }));
}
