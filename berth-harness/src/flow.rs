//! Composition of environment, mocks and the application under test.

use berth_core::BerthError;
use berth_executor::Executor;
use berth_mock::MockServer;

use crate::env::TestEnv;

/// No-op hook for [`Flow::start_with`] / [`Flow::stop_with`].
pub fn no_hook(_env: &TestEnv) -> Result<(), BerthError> {
    Ok(())
}

/// Wires the three moving parts of an integration suite together: the
/// service environment, any HTTP mocks the application depends on, and
/// the application binary itself.
///
/// `start` brings them up as before-hook, mocks, application,
/// after-hook; `stop` tears down in reverse. The hooks are where
/// suites seed databases or assert on final state.
pub struct Flow {
    env: TestEnv,
    app: Option<Executor>,
    mocks: Vec<MockServer>,
}

impl Flow {
    pub fn new(env: TestEnv) -> Self {
        Self {
            env,
            app: None,
            mocks: Vec::new(),
        }
    }

    /// Attaches the application executor. The flow takes over its
    /// start/stop lifecycle.
    pub fn with_app(mut self, app: Executor) -> Self {
        self.app = Some(app);
        self
    }

    /// Attaches a bound mock server. Resolve its address before
    /// handing it over if the application needs it as configuration.
    pub fn with_mock(mut self, mock: MockServer) -> Self {
        self.mocks.push(mock);
        self
    }

    pub fn env(&self) -> &TestEnv {
        &self.env
    }

    /// The attached executor, for `wait_ready` or output checks.
    pub fn app_mut(&mut self) -> Option<&mut Executor> {
        self.app.as_mut()
    }

    pub async fn start(&mut self) -> Result<(), BerthError> {
        self.start_with(no_hook, no_hook).await
    }

    /// Starts mocks and the application, bracketed by the hooks.
    pub async fn start_with<B, A>(&mut self, before: B, after: A) -> Result<(), BerthError>
    where
        B: FnOnce(&TestEnv) -> Result<(), BerthError>,
        A: FnOnce(&TestEnv) -> Result<(), BerthError>,
    {
        before(&self.env)?;
        for mock in &mut self.mocks {
            mock.start()?;
        }
        if let Some(app) = self.app.as_mut() {
            app.start()?;
        }
        after(&self.env)?;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), BerthError> {
        self.stop_with(no_hook, no_hook).await
    }

    /// Stops the application and mocks in reverse start order.
    ///
    /// Teardown is best effort: a failing application stop does not
    /// keep the mocks alive, and the first error is reported after
    /// everything has been torn down.
    pub async fn stop_with<B, A>(&mut self, before: B, after: A) -> Result<(), BerthError>
    where
        B: FnOnce(&TestEnv) -> Result<(), BerthError>,
        A: FnOnce(&TestEnv) -> Result<(), BerthError>,
    {
        before(&self.env)?;

        let mut first_err: Option<BerthError> = None;
        if let Some(app) = self.app.as_mut()
            && let Err(err) = app.stop().await
        {
            tracing::warn!(error = %err, "application stop failed");
            first_err = Some(err.into());
        }
        for mock in &mut self.mocks {
            if let Err(err) = mock.stop().await {
                tracing::warn!(error = %err, "mock server stop failed");
                if first_err.is_none() {
                    first_err = Some(err.into());
                }
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        after(&self.env)?;
        Ok(())
    }
}
