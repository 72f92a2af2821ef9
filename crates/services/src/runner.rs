//! Service runner boundary.
//!
//! A [`ServiceRunner`] knows how to bring up one kind of service container
//! (postgres, redis, ...) and hand back a running [`DynContainer`]. Runners are
//! looked up by name in a [`Registry`](crate::registry::Registry); the
//! [`Manager`](crate::manager::Manager) never knows what a runner does
//! internally.
//!
//! The trait comes in two flavors:
//! - [`ServiceRunner`] uses RPITIT and is what implementations write.
//! - [`DynServiceRunner`] returns [`BoxFuture`] and is dyn-compatible, so the
//!   registry can hold `Arc<dyn DynServiceRunner>`. Every `ServiceRunner`
//!   implements it via the blanket impl.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use berth_core::config::DockerSection;
use berth_core::error::ServiceError;
use berth_core::task::BoxFuture;

use crate::container::DynContainer;

/// Per-service start options, passed through to the runner untouched.
///
/// The manager treats this as an opaque payload; only the runner that owns the
/// service interprets it.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    /// Image override (runner picks its default when `None`)
    pub image: Option<String>,
    /// Extra environment variables, merged over the runner's defaults
    pub env: BTreeMap<String, String>,
    /// Command override
    pub cmd: Option<Vec<String>>,
    /// Additional container ports to publish
    pub extra_ports: Vec<u16>,
    /// Bind mounts in `host:container` form
    pub binds: Vec<String>,
    /// Readiness wait override
    pub ready_timeout: Option<Duration>,
}

impl RunOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.extra_ports.push(port);
        self
    }

    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.binds.push(bind.into());
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }
}

/// Seeds the readiness wait from the `[docker]` config section.
impl From<&DockerSection> for RunOpts {
    fn from(section: &DockerSection) -> Self {
        RunOpts::new().with_ready_timeout(Duration::from_secs(section.ready_timeout_secs))
    }
}

/// Brings up one kind of service container.
///
/// Implementations must honor the cancellation token in any internal waiting
/// (image pulls, log waits); a cancelled start should return promptly.
pub trait ServiceRunner: Send + Sync + 'static {
    /// Service name this runner answers to (e.g. `"postgres"`).
    fn name(&self) -> &str;

    /// Starts the container and waits until it is usable.
    fn run(
        &self,
        cancel: CancellationToken,
        opts: &RunOpts,
    ) -> impl Future<Output = Result<Box<dyn DynContainer>, ServiceError>> + Send;
}

/// dyn-compatible mirror of [`ServiceRunner`].
///
/// `ServiceRunner` uses RPITIT, so `dyn ServiceRunner` is not possible.
/// The registry stores `Arc<dyn DynServiceRunner>` instead.
pub trait DynServiceRunner: Send + Sync {
    /// Service name this runner answers to.
    fn name(&self) -> &str;

    /// Starts the container and waits until it is usable.
    fn run<'a>(
        &'a self,
        cancel: CancellationToken,
        opts: &'a RunOpts,
    ) -> BoxFuture<'a, Result<Box<dyn DynContainer>, ServiceError>>;
}

/// Every `ServiceRunner` is automatically a `DynServiceRunner`.
impl<T: ServiceRunner> DynServiceRunner for T {
    fn name(&self) -> &str {
        ServiceRunner::name(self)
    }

    fn run<'a>(
        &'a self,
        cancel: CancellationToken,
        opts: &'a RunOpts,
    ) -> BoxFuture<'a, Result<Box<dyn DynContainer>, ServiceError>> {
        Box::pin(ServiceRunner::run(self, cancel, opts))
    }
}

/// Verifies that a freshly started container is actually usable.
///
/// Attached per-service via
/// [`ServiceConfig::health_check`](crate::config::ServiceConfig); a failing
/// check makes the manager terminate the container and report the start as
/// failed.
pub trait HealthCheck: Send + Sync {
    fn check<'a>(
        &'a self,
        container: &'a dyn DynContainer,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), ServiceError>>;
}

/// Adapter turning a closure into a [`HealthCheck`].
pub struct HealthCheckFn<F>(F);

impl<F> HealthCheckFn<F>
where
    F: for<'a> Fn(
            &'a dyn DynContainer,
            CancellationToken,
        ) -> BoxFuture<'a, Result<(), ServiceError>>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> HealthCheck for HealthCheckFn<F>
where
    F: for<'a> Fn(
            &'a dyn DynContainer,
            CancellationToken,
        ) -> BoxFuture<'a, Result<(), ServiceError>>
        + Send
        + Sync,
{
    fn check<'a>(
        &'a self,
        container: &'a dyn DynContainer,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), ServiceError>> {
        (self.0)(container, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    struct NoopContainer;

    impl Container for NoopContainer {
        fn id(&self) -> &str {
            "noop"
        }

        fn host_port(&self, _container_port: u16) -> Option<u16> {
            None
        }

        async fn terminate(&self, _cancel: CancellationToken) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    struct NoopRunner;

    impl ServiceRunner for NoopRunner {
        fn name(&self) -> &str {
            "noop"
        }

        async fn run(
            &self,
            _cancel: CancellationToken,
            _opts: &RunOpts,
        ) -> Result<Box<dyn DynContainer>, ServiceError> {
            Ok(Box::new(NoopContainer))
        }
    }

    #[test]
    fn run_opts_builder_chains() {
        let opts = RunOpts::new()
            .with_image("postgres:15")
            .with_env("POSTGRES_DB", "app")
            .with_port(5433)
            .with_bind("/tmp/data:/data")
            .with_ready_timeout(Duration::from_secs(30));

        assert_eq!(opts.image.as_deref(), Some("postgres:15"));
        assert_eq!(opts.env.get("POSTGRES_DB").map(String::as_str), Some("app"));
        assert_eq!(opts.extra_ports, vec![5433]);
        assert_eq!(opts.binds, vec!["/tmp/data:/data"]);
        assert_eq!(opts.ready_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn run_opts_from_docker_section_sets_ready_timeout() {
        let section = DockerSection {
            socket: None,
            ready_timeout_secs: 90,
        };
        let opts = RunOpts::from(&section);
        assert_eq!(opts.ready_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn run_opts_default_is_empty() {
        let opts = RunOpts::default();
        assert!(opts.image.is_none());
        assert!(opts.env.is_empty());
        assert!(opts.cmd.is_none());
        assert!(opts.extra_ports.is_empty());
    }

    #[tokio::test]
    async fn runner_usable_through_dyn_mirror() {
        let runner: std::sync::Arc<dyn DynServiceRunner> = std::sync::Arc::new(NoopRunner);
        assert_eq!(runner.name(), "noop");

        let opts = RunOpts::default();
        let container = runner
            .run(CancellationToken::new(), &opts)
            .await
            .expect("noop runner should start");
        assert_eq!(container.id(), "noop");
    }

    #[tokio::test]
    async fn health_check_fn_adapts_closure() {
        let check = HealthCheckFn::new(|container, _cancel| {
            let healthy = container.id() == "noop";
            Box::pin(async move {
                if healthy {
                    Ok(())
                } else {
                    Err(ServiceError::Runtime("wrong container".to_owned()))
                }
            }) as BoxFuture<'_, Result<(), ServiceError>>
        });

        let container = NoopContainer;
        check
            .check(&container, CancellationToken::new())
            .await
            .expect("check should pass");
    }
}
