//! Running container handle.
//!
//! Same two-trait split as the runner boundary: [`Container`] is the RPITIT
//! trait implementations write, [`DynContainer`] is the dyn-compatible mirror
//! the manager stores. [`DynContainer::as_any`] exists for the typed accessor
//! layer, which downcasts handles back to their concrete type.

use std::any::Any;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use berth_core::error::ServiceError;
use berth_core::task::BoxFuture;

/// A running service container.
pub trait Container: Send + Sync + 'static {
    /// Container identifier assigned by the runtime.
    fn id(&self) -> &str;

    /// Host port mapped to the given container port, if published.
    fn host_port(&self, container_port: u16) -> Option<u16>;

    /// Tears the container down, releasing its resources.
    fn terminate(
        &self,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<(), ServiceError>> + Send;
}

/// dyn-compatible mirror of [`Container`].
pub trait DynContainer: Send + Sync {
    /// Container identifier assigned by the runtime.
    fn id(&self) -> &str;

    /// Host port mapped to the given container port, if published.
    fn host_port(&self, container_port: u16) -> Option<u16>;

    /// Tears the container down, releasing its resources.
    fn terminate<'a>(&'a self, cancel: CancellationToken) -> BoxFuture<'a, Result<(), ServiceError>>;

    /// Concrete-type access for typed accessors.
    fn as_any(&self) -> &dyn Any;
}

/// Every `Container` is automatically a `DynContainer`.
impl<T: Container> DynContainer for T {
    fn id(&self) -> &str {
        Container::id(self)
    }

    fn host_port(&self, container_port: u16) -> Option<u16> {
        Container::host_port(self, container_port)
    }

    fn terminate<'a>(&'a self, cancel: CancellationToken) -> BoxFuture<'a, Result<(), ServiceError>> {
        Box::pin(Container::terminate(self, cancel))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
