//! Run-scoped browser session

use action_locator::LocatorCache;
use action_primitives::{BrowserDriver, DriverError};
use selfheal_core_types::{RunId, SessionId};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::FlowError;

/// Owns the live browser handle, navigation history and the locator cache
/// of one run.
pub struct Session {
    run_id: RunId,
    session_id: SessionId,
    driver: Arc<dyn BrowserDriver>,
    cache: LocatorCache,
    history: Vec<String>,
    cancel: CancellationToken,
    released: bool,
}

impl Session {
    pub fn new(driver: Arc<dyn BrowserDriver>) -> Self {
        Self {
            run_id: RunId::new(),
            session_id: SessionId::new(),
            driver,
            cache: LocatorCache::new(),
            history: Vec::new(),
            cancel: CancellationToken::new(),
            released: false,
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_cache(mut self, cache: LocatorCache) -> Self {
        self.cache = cache;
        self
    }

    /// Cancel this session when `token` is cancelled. Releasing the session
    /// does not cancel `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token.child_token();
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn driver(&self) -> &Arc<dyn BrowserDriver> {
        &self.driver
    }

    pub fn cache(&self) -> &LocatorCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut LocatorCache {
        &mut self.cache
    }

    /// URLs navigated to by this run, oldest first
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn record_navigation(&mut self, url: impl Into<String>) {
        self.history.push(url.into());
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Await `call` unless the run is cancelled first. Session loss becomes
    /// a flow error; every other driver error is handed back to the caller.
    pub async fn drive<T, F>(&self, call: F) -> Result<Result<T, DriverError>, FlowError>
    where
        F: Future<Output = Result<T, DriverError>>,
    {
        if self.released {
            return Err(FlowError::SessionLost("session already released".into()));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled),
            outcome = call => match outcome {
                Err(DriverError::SessionLost(reason)) => Err(FlowError::SessionLost(reason)),
                other => Ok(other),
            },
        }
    }

    /// Await a non-driver future (AI calls) under the cancellation token
    pub async fn guard<T, F>(&self, call: F) -> Result<T, FlowError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled),
            value = call => Ok(value),
        }
    }

    /// Detach from the browser. Idempotent; the browser itself stays alive.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.cancel.cancel();
        if let Err(err) = self.driver.release().await {
            warn!(session_id = %self.session_id, error = %err, "driver release failed");
        }
        info!(
            run_id = %self.run_id,
            session_id = %self.session_id,
            navigations = self.history.len(),
            "session released"
        );
    }
}
