//! Flow start/stop sequencing with mocks, an app process and hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use berth_core::BerthError;
use berth_core::error::ServiceError;
use berth_executor::ExecutorBuilder;
use berth_harness::{Flow, TestEnv};
use berth_mock::MockServer;
use berth_services::builder::ServicesBuilder;
use berth_services::runner::RunOpts;

use crate::helpers::services::stub_registry;

fn stub_env() -> TestEnv {
    let builder = ServicesBuilder::new()
        .with_registry(stub_registry(&["alpha"]))
        .with_service_simple("alpha", RunOpts::new());
    TestEnv::from_builder(builder)
}

fn ping_router() -> Router {
    Router::new().route("/ping", get(|| async { "pong" }))
}

#[tokio::test]
async fn flow_brings_up_mocks_and_app_between_hooks() {
    let cancel = CancellationToken::new();
    let env = stub_env();
    env.start(&cancel).await.unwrap();

    let mock = MockServer::bind_local(ping_router()).await.unwrap();
    let mock_base = format!("http://{}", mock.local_addr());

    let app = ExecutorBuilder::new("/bin/sh")
        .with_args(["-c", "echo 'app ready'; sleep 30"])
        .with_env_var("MOCK_BASE_URL", &mock_base)
        .with_ready_pattern("app ready")
        .quiet()
        .build();

    let mut flow = Flow::new(env).with_mock(mock).with_app(app);

    let before = Arc::new(AtomicBool::new(false));
    let after = Arc::new(AtomicBool::new(false));
    {
        let before = Arc::clone(&before);
        let after = Arc::clone(&after);
        flow.start_with(
            move |env| {
                assert!(env.is_running("alpha"));
                before.store(true, Ordering::SeqCst);
                Ok(())
            },
            move |_env| {
                after.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();
    }
    assert!(before.load(Ordering::SeqCst));
    assert!(after.load(Ordering::SeqCst));

    if let Some(app) = flow.app_mut() {
        app.wait_ready(Duration::from_secs(5)).await.unwrap();
    }

    let body = reqwest::get(format!("{mock_base}/ping"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pong");

    flow.stop().await.unwrap();
    assert!(
        reqwest::Client::new()
            .get(format!("{mock_base}/ping"))
            .send()
            .await
            .is_err()
    );

    flow.env().stop(&cancel).await.unwrap();
}

#[tokio::test]
async fn failing_before_hook_aborts_start() {
    let mut flow = Flow::new(stub_env());
    let err = flow
        .start_with(
            |_env| {
                Err(BerthError::Service(ServiceError::Runtime(
                    "seed failed".to_string(),
                )))
            },
            berth_harness::no_hook,
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("seed failed"));
}

#[tokio::test]
async fn empty_flow_starts_and_stops_cleanly() {
    let mut flow = Flow::new(stub_env());
    flow.start().await.unwrap();
    flow.stop().await.unwrap();
}

#[tokio::test]
async fn stop_hooks_run_around_teardown() {
    let mut flow = Flow::new(stub_env());
    flow.start().await.unwrap();

    let before = Arc::new(AtomicBool::new(false));
    let after = Arc::new(AtomicBool::new(false));
    {
        let before = Arc::clone(&before);
        let after = Arc::clone(&after);
        flow.stop_with(
            move |_env| {
                before.store(true, Ordering::SeqCst);
                Ok(())
            },
            move |_env| {
                after.store(true, Ordering::SeqCst);
                Ok(())
            },
        )
        .await
        .unwrap();
    }
    assert!(before.load(Ordering::SeqCst));
    assert!(after.load(Ordering::SeqCst));
}
