//! Shared future type aliases.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by the dyn-compatible trait mirrors.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
