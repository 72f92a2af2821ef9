//! HTTP mock server lifecycle around an axum router.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use berth_core::MockError;

/// One mock HTTP endpoint the application under test talks to.
///
/// The listener is bound in [`MockServer::bind`], before the server
/// runs, so tests can hand the resolved address (usually from port 0)
/// to the application as configuration.
///
/// ```no_run
/// # use axum::{Router, routing::get};
/// # use berth_mock::MockServer;
/// # async fn demo() -> Result<(), berth_core::MockError> {
/// let router = Router::new().route("/v1/rates", get(|| async { "{\"usd\": 1.0}" }));
/// let mut mock = MockServer::bind_local(router).await?;
/// let base_url = format!("http://{}", mock.local_addr());
/// mock.start()?;
/// // ... point the app at base_url ...
/// mock.stop().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockServer {
    router: Option<Router>,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    log_requests: bool,
}

impl MockServer {
    /// Binds a listener on `addr` without serving yet.
    pub async fn bind(router: Router, addr: &str) -> Result<Self, MockError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MockError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| MockError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self {
            router: Some(router),
            listener: Some(listener),
            local_addr,
            cancel: CancellationToken::new(),
            task: None,
            log_requests: false,
        })
    }

    /// Binds on `127.0.0.1` with an ephemeral port.
    pub async fn bind_local(router: Router) -> Result<Self, MockError> {
        Self::bind(router, "127.0.0.1:0").await
    }

    /// Logs method, path and response status of every request through
    /// `tracing`. Must be set before [`MockServer::start`].
    pub fn with_request_logging(mut self) -> Self {
        self.log_requests = true;
        self
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts serving on the bound listener in a background task.
    pub fn start(&mut self) -> Result<(), MockError> {
        if self.task.is_some() {
            return Err(MockError::AlreadyStarted);
        }
        let (Some(listener), Some(router)) = (self.listener.take(), self.router.take()) else {
            // a stopped server keeps neither the listener nor the router
            return Err(MockError::Stopped);
        };

        let app = if self.log_requests {
            router.layer(middleware::from_fn(log_request))
        } else {
            router
        };

        let cancel = self.cancel.clone();
        let addr = self.local_addr;
        self.task = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await });
            if let Err(err) = serve.await {
                tracing::error!(%addr, error = %err, "mock server failed");
            }
        }));
        tracing::debug!(%addr, "mock server started");
        Ok(())
    }

    /// Signals graceful shutdown and waits for the serve task.
    pub async fn stop(&mut self) -> Result<(), MockError> {
        let task = self.task.take().ok_or(MockError::NotStarted)?;
        self.cancel.cancel();
        let _ = task.await;
        tracing::debug!(addr = %self.local_addr, "mock server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;
    tracing::info!(%method, %uri, status = %response.status(), "mock request");
    response
}
