//! Harness configuration -- `berth.toml` parsing and runtime settings.
//!
//! [`HarnessConfig`] is the top-level structure for everything the harness
//! reads from disk. Loading precedence:
//! 1. Environment variables (`BERTH_{SECTION}_{FIELD}`)
//! 2. Configuration file (`berth.toml`)
//! 3. Defaults (`Default` impls)
//!
//! # Usage
//! ```no_run
//! # async fn example() -> Result<(), berth_core::error::BerthError> {
//! use berth_core::config::HarnessConfig;
//!
//! // Load from file + apply environment overrides
//! let config = HarnessConfig::load("berth.toml").await?;
//!
//! // Parse directly from a TOML string
//! let config = HarnessConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BerthError, ConfigError};

/// Top-level harness configuration, the shape of `berth.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// General settings (logging)
    #[serde(default)]
    pub general: GeneralConfig,
    /// Service manager settings
    #[serde(default)]
    pub manager: ManagerSection,
    /// Docker daemon settings
    #[serde(default)]
    pub docker: DockerSection,
    /// Mock server settings
    #[serde(default)]
    pub mock: MockSection,
}

impl HarnessConfig {
    /// Load configuration from a TOML file and apply environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BerthError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file (no environment overrides).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BerthError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BerthError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BerthError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, BerthError> {
        toml::from_str(toml_str).map_err(|e| {
            BerthError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// Override configuration values from environment variables.
    ///
    /// Naming scheme: `BERTH_{SECTION}_{FIELD}`, e.g. `BERTH_DOCKER_SOCKET`.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BERTH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BERTH_GENERAL_LOG_FORMAT");

        // Manager
        override_usize(&mut self.manager.max_parallel, "BERTH_MANAGER_MAX_PARALLEL");
        override_bool(
            &mut self.manager.stop_on_error,
            "BERTH_MANAGER_STOP_ON_ERROR",
        );

        // Docker
        override_opt_string(&mut self.docker.socket, "BERTH_DOCKER_SOCKET");
        override_u64(
            &mut self.docker.ready_timeout_secs,
            "BERTH_DOCKER_READY_TIMEOUT_SECS",
        );

        // Mock
        override_string(&mut self.mock.http_addr, "BERTH_MOCK_HTTP_ADDR");
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), BerthError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.manager.max_parallel == 0 {
            return Err(ConfigError::InvalidValue {
                field: "manager.max_parallel".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }

        if self.docker.ready_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "docker.ready_timeout_secs".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log format (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Service manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSection {
    /// Maximum number of services started in parallel within a priority group
    pub max_parallel: usize,
    /// Stop every started service when one fails to start
    pub stop_on_error: bool,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            max_parallel: 10,
            stop_on_error: true,
        }
    }
}

/// Docker daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSection {
    /// Docker socket path; `None` uses the platform default
    pub socket: Option<String>,
    /// Default readiness wait per container (seconds)
    pub ready_timeout_secs: u64,
}

impl Default for DockerSection {
    fn default() -> Self {
        Self {
            socket: None,
            ready_timeout_secs: 60,
        }
    }
}

/// Mock server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSection {
    /// HTTP mock bind address; port 0 picks an ephemeral port
    pub http_addr: String,
}

impl Default for MockSection {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:0".to_owned(),
        }
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = Some(val);
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(env_key, value = %val, "ignoring non-boolean override"),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(env_key, value = %val, "ignoring non-numeric override"),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(env_key, value = %val, "ignoring non-numeric override"),
        }
    }
}
