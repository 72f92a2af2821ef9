//! Fluent construction of a [`Manager`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;

use crate::config::{ManagerConfig, ServiceConfig, ServicesMap};
use crate::manager::Manager;
use crate::registry::{Registry, default_registry};
use crate::runner::RunOpts;

/// Fluent API for configuring services.
///
/// ```no_run
/// # async fn example() -> Result<(), berth_core::error::ServiceError> {
/// use berth_services::ServicesBuilder;
/// use tokio_util::sync::CancellationToken;
///
/// let manager = ServicesBuilder::new()
///     .with_postgres(Default::default())
///     .with_redis(Default::default())
///     .build_and_start(&CancellationToken::new())
///     .await?;
///
/// let dsn = manager.must_get_postgres().dsn();
/// # Ok(())
/// # }
/// ```
pub struct ServicesBuilder {
    services: ServicesMap,
    config: ManagerConfig,
    registry: Option<Arc<Registry>>,
}

impl ServicesBuilder {
    pub fn new() -> Self {
        Self {
            services: ServicesMap::new(),
            config: ManagerConfig::default(),
            registry: None,
        }
    }

    /// Caps how many services start in parallel within a priority group.
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel = max_parallel;
        self
    }

    /// Controls whether a start failure tears down everything already started.
    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.config.stop_on_error = stop;
        self
    }

    /// Uses an explicit registry instead of the process default.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Enables PostgreSQL.
    pub fn with_postgres(mut self, opts: RunOpts) -> Self {
        self.services = self.services.enable("postgres", opts);
        self
    }

    /// Enables Redis.
    pub fn with_redis(mut self, opts: RunOpts) -> Self {
        self.services = self.services.enable("redis", opts);
        self
    }

    /// Enables MinIO.
    pub fn with_minio(mut self, opts: RunOpts) -> Self {
        self.services = self.services.enable("minio", opts);
        self
    }

    /// Enables a custom service with full configuration.
    pub fn with_service(mut self, name: impl Into<String>, cfg: ServiceConfig) -> Self {
        self.services = self.services.add(name, cfg);
        self
    }

    /// Enables a custom service with just run options.
    pub fn with_service_simple(mut self, name: impl Into<String>, opts: RunOpts) -> Self {
        self.services = self.services.enable(name, opts);
        self
    }

    /// Creates the manager without starting anything.
    pub fn build(self) -> Manager {
        let registry = self.registry.unwrap_or_else(default_registry);
        Manager::with_registry(self.services, self.config, registry)
    }

    /// Creates the manager and starts all services.
    pub async fn build_and_start(
        self,
        cancel: &CancellationToken,
    ) -> Result<Manager, ServiceError> {
        let manager = self.build();
        manager.start(cancel).await?;
        Ok(manager)
    }
}

impl Default for ServicesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a manager from a list of service names, all enabled with defaults.
pub fn manager_from_list<S: AsRef<str>>(names: &[S]) -> Manager {
    let mut services = ServicesMap::new();
    for name in names {
        services = services.enable(name.as_ref(), RunOpts::default());
    }
    Manager::new(services, ManagerConfig::default())
}

/// Creates a manager from per-service run options.
pub fn manager_from_map(cfg: impl IntoIterator<Item = (String, RunOpts)>) -> Manager {
    let mut services = ServicesMap::new();
    for (name, opts) in cfg {
        services = services.enable(name, opts);
    }
    Manager::new(services, ManagerConfig::default())
}
