//! Service runner registry.
//!
//! Maps service names to their runners. A process-wide default registry,
//! pre-populated with the built-in docker runners, backs the convenience
//! constructors; tests can swap it out with [`set_default_registry`] and
//! restore the previous one afterwards.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use berth_core::error::ServiceError;

use crate::runner::DynServiceRunner;

/// Holds all available service runners.
pub struct Registry {
    runners: RwLock<HashMap<String, Arc<dyn DynServiceRunner>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            runners: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a registry pre-populated with the built-in runners.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        crate::runners::register_builtins(&registry);
        registry
    }

    /// Registers a runner under the given name.
    ///
    /// Fails with [`ServiceError::AlreadyRegistered`] if the name is taken;
    /// the existing registration is left intact.
    pub fn register(
        &self,
        name: impl Into<String>,
        runner: Arc<dyn DynServiceRunner>,
    ) -> Result<(), ServiceError> {
        let name = name.into();
        let mut runners = self
            .runners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if runners.contains_key(&name) {
            return Err(ServiceError::AlreadyRegistered { name });
        }
        runners.insert(name, runner);
        Ok(())
    }

    /// Registers a runner, panicking on duplicate names.
    ///
    /// # Panics
    ///
    /// Panics if the name is already registered. Intended for test setup
    /// where a duplicate is a programming error.
    pub fn must_register(&self, name: impl Into<String>, runner: Arc<dyn DynServiceRunner>) {
        if let Err(err) = self.register(name, runner) {
            panic!("{err}");
        }
    }

    /// Looks up a runner by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn DynServiceRunner>> {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(Arc::clone)
    }

    /// Checks whether a runner is registered under the given name.
    pub fn has(&self, name: &str) -> bool {
        self.runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Returns all registered service names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .runners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Removes a runner. Unknown names are ignored.
    pub fn unregister(&self, name: &str) {
        self.runners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_REGISTRY: LazyLock<RwLock<Arc<Registry>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Registry::with_builtins())));

/// Returns the process-wide default registry.
pub fn default_registry() -> Arc<Registry> {
    Arc::clone(
        &DEFAULT_REGISTRY
            .read()
            .unwrap_or_else(PoisonError::into_inner),
    )
}

/// Replaces the process-wide default registry, returning the previous one.
///
/// Only managers constructed afterwards see the new registry; existing
/// managers keep the one they were built with.
pub fn set_default_registry(registry: Arc<Registry>) -> Arc<Registry> {
    let mut slot = DEFAULT_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *slot, registry)
}

/// Registers a runner in the default registry.
pub fn register(
    name: impl Into<String>,
    runner: Arc<dyn DynServiceRunner>,
) -> Result<(), ServiceError> {
    default_registry().register(name, runner)
}

/// Registers a runner in the default registry, panicking on duplicates.
pub fn must_register(name: impl Into<String>, runner: Arc<dyn DynServiceRunner>) {
    default_registry().must_register(name, runner);
}
