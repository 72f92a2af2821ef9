//! Built-in docker runners: postgres, redis, minio.
//!
//! Each runner connects to the Docker daemon lazily at `run` time, honors the
//! [`RunOpts`] overrides, and returns a typed handle
//! ([`PostgresHandle`](crate::handles::PostgresHandle) etc.) that the typed
//! accessor layer can downcast back out of the running set.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;

use crate::container::{Container, DynContainer};
use crate::docker::{ContainerSpec, DockerDaemon};
use crate::handles::{MinioHandle, PostgresHandle, RedisHandle};
use crate::registry::Registry;
use crate::runner::{RunOpts, ServiceRunner};

const POSTGRES_IMAGE: &str = "postgres:16-alpine";
const POSTGRES_PORT: u16 = 5432;
// postgres logs this twice: once during the bootstrap run, once when the real
// server is up
const POSTGRES_READY: &str = "database system is ready to accept connections";

const REDIS_IMAGE: &str = "redis:7-alpine";
const REDIS_PORT: u16 = 6379;
const REDIS_READY: &str = "Ready to accept connections";

const MINIO_IMAGE: &str = "minio/minio:latest";
const MINIO_PORT: u16 = 9000;
const MINIO_READY: &str = "Docs: https://docs.min.io";

const DEFAULT_CREDENTIAL: &str = "berth";
const MINIO_ROOT_USER: &str = "berth-access";
const MINIO_ROOT_PASSWORD: &str = "berth-secret";

/// Registers the built-in runners into the given registry.
pub fn register_builtins(registry: &Registry) {
    registry.must_register("postgres", std::sync::Arc::new(PostgresRunner));
    registry.must_register("redis", std::sync::Arc::new(RedisRunner));
    registry.must_register("minio", std::sync::Arc::new(MinioRunner));
}

fn apply_opts(mut spec: ContainerSpec, opts: &RunOpts) -> ContainerSpec {
    if let Some(image) = &opts.image {
        spec.image = image.clone();
    }
    for (key, value) in &opts.env {
        spec.env.push(format!("{key}={value}"));
    }
    if let Some(cmd) = &opts.cmd {
        spec.cmd = Some(cmd.clone());
    }
    spec.ports.extend_from_slice(&opts.extra_ports);
    spec.binds.extend_from_slice(&opts.binds);
    if let Some(timeout) = opts.ready_timeout {
        spec.ready_timeout = timeout;
    }
    spec
}

fn mapped_port(
    container: &impl Container,
    service: &str,
    port: u16,
) -> Result<u16, ServiceError> {
    container.host_port(port).ok_or_else(|| {
        ServiceError::Runtime(format!(
            "{service} container {} has no host mapping for port {port}",
            container.id()
        ))
    })
}

/// Runs a PostgreSQL container.
pub struct PostgresRunner;

impl ServiceRunner for PostgresRunner {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        opts: &RunOpts,
    ) -> Result<Box<dyn DynContainer>, ServiceError> {
        let daemon = DockerDaemon::connect_local()?;

        let mut spec = ContainerSpec::new("postgres", POSTGRES_IMAGE);
        spec.env = vec![
            format!("POSTGRES_USER={DEFAULT_CREDENTIAL}"),
            format!("POSTGRES_PASSWORD={DEFAULT_CREDENTIAL}"),
            format!("POSTGRES_DB={DEFAULT_CREDENTIAL}"),
        ];
        spec.ports = vec![POSTGRES_PORT];
        spec.ready_pattern = POSTGRES_READY.to_owned();
        spec.ready_occurrences = 2;
        let spec = apply_opts(spec, opts);

        let container = daemon.run(&spec, &cancel).await?;
        let port = mapped_port(&container, "postgres", POSTGRES_PORT)?;

        Ok(Box::new(PostgresHandle::new(
            container,
            port,
            env_value(&spec.env, "POSTGRES_USER", DEFAULT_CREDENTIAL),
            env_value(&spec.env, "POSTGRES_PASSWORD", DEFAULT_CREDENTIAL),
            env_value(&spec.env, "POSTGRES_DB", DEFAULT_CREDENTIAL),
        )))
    }
}

/// Runs a Redis container.
pub struct RedisRunner;

impl ServiceRunner for RedisRunner {
    fn name(&self) -> &str {
        "redis"
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        opts: &RunOpts,
    ) -> Result<Box<dyn DynContainer>, ServiceError> {
        let daemon = DockerDaemon::connect_local()?;

        let mut spec = ContainerSpec::new("redis", REDIS_IMAGE);
        spec.ports = vec![REDIS_PORT];
        spec.ready_pattern = REDIS_READY.to_owned();
        spec.ready_timeout = Duration::from_secs(30);
        let spec = apply_opts(spec, opts);

        let container = daemon.run(&spec, &cancel).await?;
        let port = mapped_port(&container, "redis", REDIS_PORT)?;

        Ok(Box::new(RedisHandle::new(container, port)))
    }
}

/// Runs a MinIO container.
pub struct MinioRunner;

impl ServiceRunner for MinioRunner {
    fn name(&self) -> &str {
        "minio"
    }

    async fn run(
        &self,
        cancel: CancellationToken,
        opts: &RunOpts,
    ) -> Result<Box<dyn DynContainer>, ServiceError> {
        let daemon = DockerDaemon::connect_local()?;

        let mut spec = ContainerSpec::new("minio", MINIO_IMAGE);
        spec.env = vec![
            format!("MINIO_ROOT_USER={MINIO_ROOT_USER}"),
            format!("MINIO_ROOT_PASSWORD={MINIO_ROOT_PASSWORD}"),
        ];
        spec.cmd = Some(vec!["server".to_owned(), "/data".to_owned()]);
        spec.ports = vec![MINIO_PORT];
        spec.ready_pattern = MINIO_READY.to_owned();
        let spec = apply_opts(spec, opts);

        let container = daemon.run(&spec, &cancel).await?;
        let port = mapped_port(&container, "minio", MINIO_PORT)?;

        Ok(Box::new(MinioHandle::new(
            container,
            port,
            env_value(&spec.env, "MINIO_ROOT_USER", MINIO_ROOT_USER),
            env_value(&spec.env, "MINIO_ROOT_PASSWORD", MINIO_ROOT_PASSWORD),
        )))
    }
}

// last assignment wins, so RunOpts env overrides take effect in the handle
fn env_value(env: &[String], key: &str, default: &str) -> String {
    env.iter()
        .rev()
        .find_map(|entry| entry.strip_prefix(&format!("{key}=")))
        .unwrap_or(default)
        .to_owned()
}
