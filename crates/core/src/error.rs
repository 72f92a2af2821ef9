//! Error types -- one enum per domain, a top-level wrapper for `?` ergonomics.

/// Boxed error cause carried by variants that wrap a lower-level failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level berth error.
#[derive(Debug, thiserror::Error)]
pub enum BerthError {
    /// Service lifecycle error
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Application executor error
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Mock server error
    #[error("mock server error: {0}")]
    Mock(#[from] MockError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Service lifecycle errors.
///
/// Every variant names the service it concerns; variants wrapping a
/// lower-level failure preserve it as a `source`.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Name not present in the registry at start time.
    #[error("service '{name}' not found in registry")]
    NotFound { name: String },

    /// Lookup, restart, or stop against a name with no running record.
    #[error("service '{name}' is not running")]
    NotRunning { name: String },

    /// A declared dependency was not in the running set when the dependent
    /// service's start was attempted.
    #[error("service '{name}' depends on '{dependency}' which is not running")]
    DependencyNotMet { name: String, dependency: String },

    /// The runner invocation returned an error.
    #[error("failed to start service '{name}': {source}")]
    StartFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The health check returned an error after a successful start.
    /// The just-started container is terminated best-effort.
    #[error("health check failed for service '{name}': {source}")]
    HealthCheckFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The termination call failed.
    #[error("failed to stop service '{name}': {source}")]
    StopFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Duplicate registry registration under the same name.
    #[error("service '{name}' is already registered")]
    AlreadyRegistered { name: String },

    /// A typed accessor's expected container type does not match the actual
    /// running container's type.
    #[error("service '{name}' container cannot be cast to {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    /// Cancellation was observed while starting the named service.
    #[error("startup of service '{name}' was cancelled")]
    Cancelled { name: String },

    /// Aggregate of per-service stop failures; each entry is
    /// `name: reason`, joined with `; `.
    #[error("failed to stop some services: {0}")]
    StopIncomplete(String),

    /// Container-runtime-level failure (connect, pull, create, inspect).
    /// Produced inside runners; the manager wraps it as `StartFailed`.
    #[error("container runtime error: {0}")]
    Runtime(String),
}

/// Application executor errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The binary under test could not be spawned.
    #[error("failed to spawn '{binary}': {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// A lifecycle call was made before `start`.
    #[error("executor has not been started")]
    NotStarted,

    /// A fault pattern was seen in the process output.
    #[error("pattern {pattern:?} detected {hits} time(s) in process output")]
    PatternDetected { pattern: String, hits: usize },

    /// The readiness pattern did not appear within the allowed time.
    #[error("process not ready: pattern {pattern:?} not seen within {secs}s")]
    ReadyTimeout { pattern: String, secs: u64 },

    /// The process exited with a non-zero status.
    #[error("'{binary}' exited with code {code}")]
    NonZeroExit { binary: String, code: i32 },

    /// Sending a signal to the process failed.
    #[error("failed to signal process: {0}")]
    Signal(String),

    /// Waiting for process exit failed.
    #[error("failed to wait for process: {0}")]
    Wait(String),
}

/// Mock server errors.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// The listener could not be bound.
    #[error("failed to bind mock server to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `stop` was called before `start`.
    #[error("mock server has not been started")]
    NotStarted,

    /// `start` was called twice.
    #[error("mock server is already running")]
    AlreadyStarted,

    /// `start` after `stop`; the listener is gone and a stopped server
    /// cannot be restarted.
    #[error("mock server has been stopped and cannot be restarted")]
    Stopped,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// Configuration parsing failed.
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// Invalid configuration value.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}
