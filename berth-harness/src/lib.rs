#![doc = include_str!("../README.md")]

pub mod env;
pub mod flow;
pub mod logging;

pub use env::TestEnv;
pub use flow::{Flow, no_hook};
pub use logging::init_tracing;
