//! Shared test helpers.

pub mod services;
