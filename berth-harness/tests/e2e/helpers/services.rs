//! Stub runners and containers for driving the manager without a
//! container runtime.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;
use berth_services::container::{Container, DynContainer};
use berth_services::registry::Registry;
use berth_services::runner::{RunOpts, ServiceRunner};

pub struct StubContainer {
    id: String,
    terminations: Arc<AtomicUsize>,
}

impl Container for StubContainer {
    fn id(&self) -> &str {
        &self.id
    }

    fn host_port(&self, _container_port: u16) -> Option<u16> {
        None
    }

    async fn terminate(&self, _cancel: CancellationToken) -> Result<(), ServiceError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runner that hands out numbered stub containers and counts runs and
/// terminations across them.
pub struct StubRunner {
    name: String,
    runs: Arc<AtomicUsize>,
    terminations: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl StubRunner {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            runs: Arc::new(AtomicUsize::new(0)),
            terminations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.runs)
    }

    pub fn terminations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.terminations)
    }
}

impl ServiceRunner for StubRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _cancel: CancellationToken,
        _opts: &RunOpts,
    ) -> Result<Box<dyn DynContainer>, ServiceError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(StubContainer {
            id: format!("{}-{}", self.name, n),
            terminations: Arc::clone(&self.terminations),
        }))
    }
}

/// Registry populated with one stub runner per name.
pub fn stub_registry(names: &[&str]) -> Arc<Registry> {
    let registry = Registry::new();
    for name in names {
        registry.must_register(*name, Arc::new(StubRunner::new(name)));
    }
    Arc::new(registry)
}
