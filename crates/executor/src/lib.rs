#![doc = include_str!("../README.md")]

pub mod executor;
pub mod pattern;

pub use executor::{Executor, ExecutorBuilder};
pub use pattern::{DEFAULT_FAULT_PATTERN, PatternDetector};
