#![doc = include_str!("../README.md")]

pub mod builder;
pub mod config;
pub mod container;
pub mod docker;
pub mod handles;
pub mod manager;
pub mod registry;
pub mod runner;
pub mod runners;

// --- core re-exports ---

pub use builder::{ServicesBuilder, manager_from_list, manager_from_map};
pub use config::{ManagerConfig, ServiceConfig, ServicesMap};
pub use container::{Container, DynContainer};
pub use docker::{ContainerSpec, DockerContainer, DockerDaemon};
pub use handles::{MinioHandle, PostgresHandle, RedisHandle};
pub use manager::{Manager, RunningService};
pub use registry::{Registry, default_registry, must_register, register, set_default_registry};
pub use runner::{DynServiceRunner, HealthCheck, HealthCheckFn, RunOpts, ServiceRunner};
pub use runners::{MinioRunner, PostgresRunner, RedisRunner, register_builtins};
