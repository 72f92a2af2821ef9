//! Integration tests for the berth harness composition layer.
//!
//! - `helpers/` -- stub runners and registries shared across scenarios
//! - `scenarios/` -- test files organized by concern
//!
//! The scenarios run against stub runners, so no container runtime is
//! needed; the docker-backed runners are covered by suites that opt in
//! to a live daemon.

mod helpers;
mod scenarios;
