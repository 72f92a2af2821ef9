//! TestEnv lifecycle against stub runners.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;
use berth_harness::TestEnv;
use berth_services::builder::ServicesBuilder;
use berth_services::registry::Registry;
use berth_services::runner::RunOpts;

use crate::helpers::services::{StubRunner, stub_registry};

fn two_service_env() -> TestEnv {
    let builder = ServicesBuilder::new()
        .with_registry(stub_registry(&["alpha", "beta"]))
        .with_service_simple("alpha", RunOpts::new())
        .with_service_simple("beta", RunOpts::new());
    TestEnv::from_builder(builder)
}

#[tokio::test]
async fn start_and_stop_round_trip() {
    let cancel = CancellationToken::new();
    let env = two_service_env();

    env.start(&cancel).await.unwrap();
    assert_eq!(env.list_running(), vec!["alpha", "beta"]);
    assert!(env.is_running("alpha"));

    env.stop(&cancel).await.unwrap();
    assert!(env.list_running().is_empty());
    assert!(!env.is_running("alpha"));
}

#[tokio::test]
async fn typed_getter_fails_when_service_not_running() {
    let env = two_service_env();
    let err = env.get_postgres().unwrap_err();
    assert!(matches!(err, ServiceError::NotRunning { .. }));
}

#[tokio::test]
async fn restart_hands_out_a_fresh_container() {
    let cancel = CancellationToken::new();
    let env = two_service_env();
    env.start(&cancel).await.unwrap();

    let before = env.manager().get_container("alpha").unwrap().id().to_owned();
    env.restart(&cancel, "alpha").await.unwrap();
    let after = env.manager().get_container("alpha").unwrap().id().to_owned();

    assert_ne!(before, after);
    env.stop(&cancel).await.unwrap();
}

#[tokio::test]
async fn restart_all_reruns_every_service() {
    let cancel = CancellationToken::new();
    let alpha = StubRunner::new("alpha");
    let alpha_runs = alpha.runs();
    let registry = Registry::new();
    registry.must_register("alpha", Arc::new(alpha));
    registry.must_register("beta", Arc::new(StubRunner::new("beta")));

    let builder = ServicesBuilder::new()
        .with_registry(Arc::new(registry))
        .with_service_simple("alpha", RunOpts::new())
        .with_service_simple("beta", RunOpts::new());
    let env = TestEnv::from_builder(builder);

    env.start(&cancel).await.unwrap();
    env.restart_all(&cancel).await.unwrap();

    assert_eq!(env.list_running(), vec!["alpha", "beta"]);
    assert_eq!(alpha_runs.load(Ordering::SeqCst), 2);
    env.stop(&cancel).await.unwrap();
}

#[tokio::test]
async fn from_list_builds_an_idle_environment() {
    let env = TestEnv::from_list(&["postgres", "redis"]);
    assert!(env.list_running().is_empty());
    assert!(!env.is_running("postgres"));
}
