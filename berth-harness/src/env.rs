//! Test environment wrapper around the service lifecycle manager.

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;
use berth_services::builder::{ServicesBuilder, manager_from_list};
use berth_services::handles::{MinioHandle, PostgresHandle, RedisHandle};
use berth_services::manager::Manager;

/// The set of backing services one test suite runs against.
///
/// Thin facade over [`Manager`]: suites construct it once (usually in a
/// shared entry point), start it, run their tests against the typed
/// handles, and stop it at the end.
pub struct TestEnv {
    manager: Manager,
}

impl TestEnv {
    /// Environment from service names with default configuration.
    pub fn from_list<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            manager: manager_from_list(names),
        }
    }

    /// Environment from a configured builder.
    pub fn from_builder(builder: ServicesBuilder) -> Self {
        Self {
            manager: builder.build(),
        }
    }

    /// Environment adopting an already constructed manager.
    pub fn from_manager(manager: Manager) -> Self {
        Self { manager }
    }

    /// Direct access to the underlying manager.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        tracing::info!("starting test environment");
        self.manager.start(cancel).await
    }

    pub async fn stop(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        tracing::info!("stopping test environment");
        self.manager.stop(cancel).await
    }

    pub async fn restart(&self, cancel: &CancellationToken, name: &str) -> Result<(), ServiceError> {
        self.manager.restart(cancel, name).await
    }

    pub async fn restart_all(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        self.manager.restart_all(cancel).await
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.manager.is_running(name)
    }

    pub fn list_running(&self) -> Vec<String> {
        self.manager.list_running()
    }

    pub fn get_postgres(&self) -> Result<PostgresHandle, ServiceError> {
        self.manager.get_postgres()
    }

    pub fn must_get_postgres(&self) -> PostgresHandle {
        self.manager.must_get_postgres()
    }

    pub fn get_redis(&self) -> Result<RedisHandle, ServiceError> {
        self.manager.get_redis()
    }

    pub fn must_get_redis(&self) -> RedisHandle {
        self.manager.must_get_redis()
    }

    pub fn get_minio(&self) -> Result<MinioHandle, ServiceError> {
        self.manager.get_minio()
    }

    pub fn must_get_minio(&self) -> MinioHandle {
        self.manager.must_get_minio()
    }
}
