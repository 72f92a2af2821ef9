//! Typed handles for the built-in services, plus the typed accessors on
//! [`Manager`].
//!
//! A handle wraps the raw [`DockerContainer`] with the connection details a
//! test actually wants (DSN, URL, credentials). `Manager::get_postgres` and
//! friends fetch the running container and downcast it back to its handle
//! type; a name that resolves to some other container kind fails with
//! [`ServiceError::TypeMismatch`]. The `must_*` variants panic instead, as a
//! deliberate test-setup shortcut.

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;

use crate::container::Container;
use crate::docker::DockerContainer;
use crate::manager::Manager;

/// Running PostgreSQL service.
#[derive(Debug, Clone)]
pub struct PostgresHandle {
    inner: DockerContainer,
    port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl PostgresHandle {
    pub(crate) fn new(
        inner: DockerContainer,
        port: u16,
        user: String,
        password: String,
        database: String,
    ) -> Self {
        Self {
            inner,
            port,
            user,
            password,
            database,
        }
    }

    /// Host port mapped to the server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection string for the bootstrap database.
    pub fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@127.0.0.1:{}/{}",
            self.user, self.password, self.port, self.database
        )
    }
}

impl Container for PostgresHandle {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.inner.host_port(container_port)
    }

    async fn terminate(&self, cancel: CancellationToken) -> Result<(), ServiceError> {
        self.inner.terminate(cancel).await
    }
}

/// Running Redis service.
#[derive(Debug, Clone)]
pub struct RedisHandle {
    inner: DockerContainer,
    port: u16,
}

impl RedisHandle {
    pub(crate) fn new(inner: DockerContainer, port: u16) -> Self {
        Self { inner, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn url(&self) -> String {
        format!("redis://127.0.0.1:{}", self.port)
    }
}

impl Container for RedisHandle {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.inner.host_port(container_port)
    }

    async fn terminate(&self, cancel: CancellationToken) -> Result<(), ServiceError> {
        self.inner.terminate(cancel).await
    }
}

/// Running MinIO service.
#[derive(Debug, Clone)]
pub struct MinioHandle {
    inner: DockerContainer,
    port: u16,
    pub access_key: String,
    pub secret_key: String,
}

impl MinioHandle {
    pub(crate) fn new(
        inner: DockerContainer,
        port: u16,
        access_key: String,
        secret_key: String,
    ) -> Self {
        Self {
            inner,
            port,
            access_key,
            secret_key,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Container for MinioHandle {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        self.inner.host_port(container_port)
    }

    async fn terminate(&self, cancel: CancellationToken) -> Result<(), ServiceError> {
        self.inner.terminate(cancel).await
    }
}

impl Manager {
    /// Returns the running PostgreSQL handle.
    pub fn get_postgres(&self) -> Result<PostgresHandle, ServiceError> {
        self.typed_container("postgres")
    }

    /// Returns the running PostgreSQL handle, panicking on any failure.
    pub fn must_get_postgres(&self) -> PostgresHandle {
        must(self.get_postgres())
    }

    /// Returns the running Redis handle.
    pub fn get_redis(&self) -> Result<RedisHandle, ServiceError> {
        self.typed_container("redis")
    }

    /// Returns the running Redis handle, panicking on any failure.
    pub fn must_get_redis(&self) -> RedisHandle {
        must(self.get_redis())
    }

    /// Returns the running MinIO handle.
    pub fn get_minio(&self) -> Result<MinioHandle, ServiceError> {
        self.typed_container("minio")
    }

    /// Returns the running MinIO handle, panicking on any failure.
    pub fn must_get_minio(&self) -> MinioHandle {
        must(self.get_minio())
    }

    fn typed_container<T: Clone + 'static>(&self, name: &str) -> Result<T, ServiceError> {
        let container = self.get_container(name)?;
        container
            .as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ServiceError::TypeMismatch {
                name: name.to_owned(),
                expected: std::any::type_name::<T>(),
            })
    }
}

fn must<T>(result: Result<T, ServiceError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ManagerConfig, ServicesMap};
    use crate::manager::test_support::MockRunner;
    use crate::registry::Registry;
    use crate::runner::RunOpts;

    async fn manager_with_mock_postgres() -> Manager {
        let registry = Registry::new();
        registry.must_register("postgres", Arc::new(MockRunner::new("postgres")));

        let services = ServicesMap::new().enable("postgres", RunOpts::default());
        let manager =
            Manager::with_registry(services, ManagerConfig::default(), Arc::new(registry));
        manager.start(&CancellationToken::new()).await.unwrap();
        manager
    }

    // handles show up in assertion output, so they must stay Debug + Clone
    #[test]
    fn handles_are_debug_and_clone() {
        fn assert_impls<T: std::fmt::Debug + Clone>() {}
        assert_impls::<PostgresHandle>();
        assert_impls::<RedisHandle>();
        assert_impls::<MinioHandle>();
    }

    #[tokio::test]
    async fn typed_getter_fails_with_type_mismatch() {
        // the mock runner hands out a MockContainer, not a PostgresHandle
        let manager = manager_with_mock_postgres().await;

        let err = manager.get_postgres().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::TypeMismatch { ref name, .. } if name == "postgres"
        ));
    }

    #[tokio::test]
    async fn typed_getter_fails_with_not_running() {
        let manager = Manager::with_registry(
            ServicesMap::new(),
            ManagerConfig::default(),
            Arc::new(Registry::new()),
        );

        let err = manager.get_redis().unwrap_err();
        assert!(matches!(err, ServiceError::NotRunning { ref name } if name == "redis"));
    }

    #[tokio::test]
    #[should_panic(expected = "cannot be cast")]
    async fn must_getter_panics_on_type_mismatch() {
        let manager = manager_with_mock_postgres().await;
        let _ = manager.must_get_postgres();
    }

    #[tokio::test]
    #[should_panic(expected = "is not running")]
    async fn must_getter_panics_when_not_running() {
        let manager = Manager::with_registry(
            ServicesMap::new(),
            ManagerConfig::default(),
            Arc::new(Registry::new()),
        );
        let _ = manager.must_get_minio();
    }
}
