//! Service lifecycle manager.
//!
//! [`Manager`] starts named, interdependent service containers in ascending
//! priority groups with bounded parallelism, tears them down in reverse
//! priority order, and tracks the running set.
//!
//! # Startup
//!
//! ```text
//! group 0 ──▶ group 1 ──▶ ... ──▶ group N
//!    │ (parallel, bounded by max_parallel)
//!    ├─ dependency check ─▶ registry lookup ─▶ runner.run ─▶ health check
//!    └─ first failure cancels the group; with stop_on_error the manager
//!       then stops everything already started and returns the failure
//! ```
//!
//! The running-set lock is a plain `std::sync::RwLock` held only for map
//! access, never across an `.await`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use berth_core::error::ServiceError;

use crate::config::{ManagerConfig, ServiceConfig, ServicesMap};
use crate::container::DynContainer;
use crate::registry::{Registry, default_registry};

/// A running service: its container plus the config snapshot it started from.
#[derive(Clone)]
pub struct RunningService {
    pub name: String,
    pub container: Arc<dyn DynContainer>,
    pub config: ServiceConfig,
}

impl std::fmt::Debug for RunningService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningService")
            .field("name", &self.name)
            .field("container_id", &self.container.id())
            .field("config", &self.config)
            .finish()
    }
}

/// Manages the lifecycle of multiple service containers.
pub struct Manager {
    running: RwLock<HashMap<String, RunningService>>,
    config: ServicesMap,
    registry: Arc<Registry>,
    mconfig: ManagerConfig,
}

impl Manager {
    /// Creates a manager bound to the current default registry.
    pub fn new(services: ServicesMap, config: ManagerConfig) -> Self {
        Self::with_registry(services, config, default_registry())
    }

    /// Creates a manager with an explicit registry.
    pub fn with_registry(
        services: ServicesMap,
        config: ManagerConfig,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            running: RwLock::new(HashMap::new()),
            config: services,
            registry,
            mconfig: config,
        }
    }

    /// Starts all enabled services in ascending priority groups.
    ///
    /// A group only begins once the previous group has fully completed. On
    /// failure with `stop_on_error` set, every already started service is
    /// stopped (best effort) before the original error is returned.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        info!(total = self.config.len(), "starting services");

        let groups = self.group_by_priority();

        for (priority, group) in &groups {
            if let Err(err) = self.start_group(cancel, *priority, group).await {
                if self.mconfig.stop_on_error {
                    error!(error = %err, "stopping all services after start failure");
                    // cleanup runs on a fresh token so it proceeds even when
                    // the caller's token has already fired
                    if let Err(stop_err) = self.stop(&CancellationToken::new()).await {
                        warn!(error = %stop_err, "cleanup after failed start was incomplete");
                    }
                }
                return Err(err);
            }
        }

        info!("all services started");
        Ok(())
    }

    /// Stops all running services in descending priority order.
    ///
    /// Terminations within the teardown run in parallel. Each failure is
    /// collected; services that did stop are removed from the running set
    /// even when siblings fail. An empty running set is an `Ok` no-op.
    pub async fn stop(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        let mut envs = self.snapshot_running();
        if envs.is_empty() {
            info!("no services to stop");
            return Ok(());
        }

        info!(count = envs.len(), "stopping services");
        envs.sort_by(|a, b| b.config.priority.cmp(&a.config.priority));

        let results: Vec<Result<(), ServiceError>> =
            futures::stream::iter(envs.iter().map(|env| self.stop_service(cancel.clone(), env)))
                .buffer_unordered(self.mconfig.max_parallel)
                .collect()
                .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|r| r.err().map(|e| e.to_string()))
            .collect();

        if failures.is_empty() {
            info!("all services stopped");
            Ok(())
        } else {
            let joined = failures.join("; ");
            error!(error = %joined, "failed to stop some services");
            Err(ServiceError::StopIncomplete(joined))
        }
    }

    /// Restarts a single running service from its running-record snapshot.
    ///
    /// Bypasses priority grouping; dependencies are checked against the
    /// currently running set.
    pub async fn restart(&self, cancel: &CancellationToken, name: &str) -> Result<(), ServiceError> {
        info!(name, "restarting service");

        let env = self.get(name)?;
        self.stop_service(cancel.clone(), &env).await?;

        let running = self.running_names();
        self.start_service(cancel.clone(), name, &env.config, &running)
            .await?;

        info!(name, "service restarted");
        Ok(())
    }

    /// Stops and restarts every running service.
    ///
    /// The restart works off the running-record config snapshots, not the
    /// declared config, so only what was actually running comes back. A
    /// start-phase failure leaves this manager's running set empty and
    /// surfaces the start error.
    pub async fn restart_all(&self, cancel: &CancellationToken) -> Result<(), ServiceError> {
        info!("restarting all services");

        let envs = self.snapshot_running();
        if envs.is_empty() {
            info!("no services to restart");
            return Ok(());
        }

        self.stop(cancel).await?;

        let mut configs = ServicesMap::new();
        for env in &envs {
            configs = configs.add(env.name.clone(), env.config.clone());
        }

        // transient manager over the recovered configs, same registry
        let transient = Manager::with_registry(configs, self.mconfig, Arc::clone(&self.registry));
        transient.start(cancel).await?;

        let adopted = transient.take_running();
        *self
            .running
            .write()
            .unwrap_or_else(PoisonError::into_inner) = adopted;

        info!("all services restarted");
        Ok(())
    }

    /// Retrieves a running service record by name.
    pub fn get(&self, name: &str) -> Result<RunningService, ServiceError> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotRunning {
                name: name.to_owned(),
            })
    }

    /// Retrieves the container of a running service.
    pub fn get_container(&self, name: &str) -> Result<Arc<dyn DynContainer>, ServiceError> {
        Ok(self.get(name)?.container)
    }

    /// Checks whether a service is currently running.
    pub fn is_running(&self, name: &str) -> bool {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns all running service names, sorted.
    pub fn list_running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn group_by_priority(&self) -> BTreeMap<i32, Vec<(String, ServiceConfig)>> {
        let mut groups: BTreeMap<i32, Vec<(String, ServiceConfig)>> = BTreeMap::new();
        for (name, cfg) in self.config.iter() {
            if !cfg.enabled {
                continue;
            }
            groups
                .entry(cfg.priority)
                .or_default()
                .push((name.clone(), cfg.clone()));
        }
        groups
    }

    async fn start_group(
        &self,
        cancel: &CancellationToken,
        priority: i32,
        group: &[(String, ServiceConfig)],
    ) -> Result<(), ServiceError> {
        debug!(priority, count = group.len(), "starting service group");

        // dependency checks inside the group read this pre-group snapshot, so
        // a dependency on a sibling of the same priority is never satisfied
        let running_before = self.running_names();
        let child = cancel.child_token();

        let mut starts = futures::stream::iter(group.iter().map(|(name, cfg)| {
            let child = child.clone();
            let running_before = &running_before;
            async move { self.start_service(child, name, cfg, running_before).await }
        }))
        .buffer_unordered(self.mconfig.max_parallel);

        // first error wins; cancel the rest and drain their results
        let mut first_err = None;
        while let Some(result) = starts.next().await {
            if let Err(err) = result
                && first_err.is_none()
            {
                child.cancel();
                first_err = Some(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn start_service(
        &self,
        cancel: CancellationToken,
        name: &str,
        cfg: &ServiceConfig,
        running_before: &HashSet<String>,
    ) -> Result<(), ServiceError> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled {
                name: name.to_owned(),
            });
        }

        debug!(name, "starting service");

        for dep in &cfg.dependencies {
            if !running_before.contains(dep) {
                return Err(ServiceError::DependencyNotMet {
                    name: name.to_owned(),
                    dependency: dep.clone(),
                });
            }
        }

        let runner = self
            .registry
            .get(name)
            .ok_or_else(|| ServiceError::NotFound {
                name: name.to_owned(),
            })?;

        let container = runner
            .run(cancel.clone(), &cfg.opts)
            .await
            .map_err(|err| ServiceError::StartFailed {
                name: name.to_owned(),
                source: Box::new(err),
            })?;
        let container: Arc<dyn DynContainer> = Arc::from(container);

        if let Some(check) = &cfg.health_check
            && let Err(err) = check.check(container.as_ref(), cancel.clone()).await
        {
            // the unhealthy container must not enter the running set
            if let Err(term_err) = container.terminate(cancel).await {
                warn!(name, error = %term_err, "failed to terminate container after health check failure");
            }
            return Err(ServiceError::HealthCheckFailed {
                name: name.to_owned(),
                source: Box::new(err),
            });
        }

        self.running
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                name.to_owned(),
                RunningService {
                    name: name.to_owned(),
                    container,
                    config: cfg.clone(),
                },
            );

        info!(name, "service started");
        Ok(())
    }

    async fn stop_service(
        &self,
        cancel: CancellationToken,
        env: &RunningService,
    ) -> Result<(), ServiceError> {
        debug!(name = %env.name, "stopping service");

        env.container
            .terminate(cancel)
            .await
            .map_err(|err| ServiceError::StopFailed {
                name: env.name.clone(),
                source: Box::new(err),
            })?;

        self.running
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&env.name);

        info!(name = %env.name, "service stopped");
        Ok(())
    }

    fn snapshot_running(&self) -> Vec<RunningService> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn running_names(&self) -> HashSet<String> {
        self.running
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn take_running(&self) -> HashMap<String, RunningService> {
        let mut guard = self
            .running
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Mock runner and container shared by the in-crate tests.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use berth_core::error::ServiceError;

    use crate::container::{Container, DynContainer};
    use crate::runner::{RunOpts, ServiceRunner};

    pub(crate) struct MockContainer {
        id: String,
        terminations: Arc<AtomicUsize>,
        fail_terminate: bool,
    }

    impl Container for MockContainer {
        fn id(&self) -> &str {
            &self.id
        }

        fn host_port(&self, _container_port: u16) -> Option<u16> {
            None
        }

        async fn terminate(&self, _cancel: CancellationToken) -> Result<(), ServiceError> {
            if self.fail_terminate {
                return Err(ServiceError::Runtime(format!(
                    "mock terminate failure for '{}'",
                    self.id
                )));
            }
            self.terminations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Runner that fabricates containers without touching any runtime.
    ///
    /// Counts runs and terminations so tests can assert exact lifecycle
    /// behavior; each run hands out a container with a fresh id.
    pub(crate) struct MockRunner {
        name: String,
        delay: Duration,
        fail_run: bool,
        fail_terminate: bool,
        runs: Arc<AtomicUsize>,
        terminations: Arc<AtomicUsize>,
    }

    impl MockRunner {
        pub(crate) fn new(name: &str) -> Self {
            Self {
                name: name.to_owned(),
                delay: Duration::ZERO,
                fail_run: false,
                fail_terminate: false,
                runs: Arc::new(AtomicUsize::new(0)),
                terminations: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn failing_run(mut self) -> Self {
            self.fail_run = true;
            self
        }

        pub(crate) fn failing_terminate(mut self) -> Self {
            self.fail_terminate = true;
            self
        }

        pub(crate) fn runs(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.runs)
        }

        pub(crate) fn terminations(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.terminations)
        }
    }

    impl ServiceRunner for MockRunner {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &self,
            cancel: CancellationToken,
            _opts: &RunOpts,
        ) -> Result<Box<dyn DynContainer>, ServiceError> {
            if self.delay > Duration::ZERO {
                tokio::select! {
                    () = tokio::time::sleep(self.delay) => {}
                    () = cancel.cancelled() => {
                        return Err(ServiceError::Cancelled {
                            name: self.name.clone(),
                        });
                    }
                }
            }
            if self.fail_run {
                return Err(ServiceError::Runtime(format!(
                    "mock start failure for '{}'",
                    self.name
                )));
            }
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockContainer {
                id: format!("{}-{}", self.name, n),
                terminations: Arc::clone(&self.terminations),
                fail_terminate: self.fail_terminate,
            }))
        }
    }
}
