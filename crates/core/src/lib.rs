#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod task;

// --- core re-exports ---
// The types every other crate in the workspace needs by name.

// errors
pub use error::{
    BerthError, BoxError, ConfigError, ExecutorError, MockError, ServiceError,
};

// configuration
pub use config::HarnessConfig;

// futures
pub use task::BoxFuture;
