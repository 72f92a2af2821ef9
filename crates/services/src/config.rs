//! Per-service and per-manager configuration model.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use berth_core::config::ManagerSection;

use crate::runner::{HealthCheck, RunOpts};

/// Configuration for a single managed service.
#[derive(Clone, Default)]
pub struct ServiceConfig {
    /// Startup order (lower starts first). Services sharing a priority start
    /// in parallel.
    pub priority: i32,
    /// Names of services that must already be running before this one starts.
    pub dependencies: Vec<String>,
    /// Options handed to the runner untouched.
    pub opts: RunOpts,
    /// Optional readiness verification run right after a successful start.
    pub health_check: Option<Arc<dyn HealthCheck>>,
    /// Disabled services are skipped entirely, including for dependency
    /// satisfaction.
    pub enabled: bool,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("opts", &self.opts)
            .field("has_health_check", &self.health_check.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Named service configurations, ordered by name.
#[derive(Debug, Clone, Default)]
pub struct ServicesMap(BTreeMap<String, ServiceConfig>);

impl ServicesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fully specified service configuration.
    pub fn add(mut self, name: impl Into<String>, cfg: ServiceConfig) -> Self {
        self.0.insert(name.into(), cfg);
        self
    }

    /// Enables a service at the default priority.
    pub fn enable(self, name: impl Into<String>, opts: RunOpts) -> Self {
        self.add(
            name,
            ServiceConfig {
                enabled: true,
                opts,
                ..ServiceConfig::default()
            },
        )
    }

    /// Enables a service at a specific priority.
    pub fn enable_with_priority(
        self,
        name: impl Into<String>,
        priority: i32,
        opts: RunOpts,
    ) -> Self {
        self.add(
            name,
            ServiceConfig {
                enabled: true,
                priority,
                opts,
                ..ServiceConfig::default()
            },
        )
    }

    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ServiceConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Manager-level settings.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// Maximum number of services started in parallel within a priority group.
    pub max_parallel: usize,
    /// Stop every started service when one fails to start.
    pub stop_on_error: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            stop_on_error: true,
        }
    }
}

impl From<&ManagerSection> for ManagerConfig {
    fn from(section: &ManagerSection) -> Self {
        Self {
            max_parallel: section.max_parallel,
            stop_on_error: section.stop_on_error,
        }
    }
}
