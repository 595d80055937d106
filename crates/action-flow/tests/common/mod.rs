#![allow(dead_code)]

use action_flow::{HealRequest, HealingProvider, ProviderError};
use action_primitives::{
    AxNode, BrowserDriver, DebugHandle, DriverError, FixtureDriver, FixtureSite, HealingTier,
    Locator, LocatorCandidate, PageSnapshot,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub const LOGIN_URL: &str = "https://app.test/login";

type Reshape = Box<dyn FnOnce(&mut PageSnapshot) + Send>;

/// Login page after a redesign: the button now reads "Sign In" and the old
/// `#login-btn` id is gone.
pub fn login_page() -> PageSnapshot {
    PageSnapshot::new(
        LOGIN_URL,
        "Login",
        vec![
            AxNode::new("heading", "Please sign in").with_text("Please sign in"),
            AxNode::new("textbox", "Email").with_placeholder("you@example.com"),
            AxNode::new("button", "Sign In")
                .with_text("Sign In")
                .with_css("form > button.primary"),
        ],
    )
}

/// Fixture driver where selected selectors hang until the step times out
pub struct ScriptedDriver {
    inner: FixtureDriver,
    hanging: Mutex<HashSet<String>>,
    actions: Mutex<Vec<Locator>>,
    reshapes: Mutex<Vec<(String, String, Reshape)>>,
}

impl ScriptedDriver {
    pub fn new(pages: Vec<PageSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            inner: FixtureDriver::new(FixtureSite {
                start_url: None,
                pages,
            }),
            hanging: Mutex::new(HashSet::new()),
            actions: Mutex::new(Vec::new()),
            reshapes: Mutex::new(Vec::new()),
        })
    }

    pub fn login() -> Arc<Self> {
        Self::new(vec![login_page()])
    }

    pub fn hang_on(self: &Arc<Self>, selector: &str) -> Arc<Self> {
        self.hanging.lock().insert(selector.to_string());
        self.clone()
    }

    /// Re-render the page at `url` the first time `selector` is acted on
    pub fn reshape_on<F>(self: &Arc<Self>, selector: &str, url: &str, reshape: F) -> Arc<Self>
    where
        F: FnOnce(&mut PageSnapshot) + Send + 'static,
    {
        self.reshapes
            .lock()
            .push((selector.to_string(), url.to_string(), Box::new(reshape)));
        self.clone()
    }

    /// Locators the driver was asked to act on, in order
    pub fn actions(&self) -> Vec<Locator> {
        self.actions.lock().clone()
    }

    fn check(&self, locator: &Locator) -> Result<(), DriverError> {
        self.actions.lock().push(locator.clone());
        let due: Vec<(String, String, Reshape)> = {
            let mut reshapes = self.reshapes.lock();
            let (due, pending): (Vec<_>, Vec<_>) = reshapes
                .drain(..)
                .partition(|(selector, _, _)| *selector == locator.selector);
            *reshapes = pending;
            due
        };
        for (_, url, reshape) in due {
            self.inner.update_page(&url, reshape);
        }
        if self.hanging.lock().contains(&locator.selector) {
            return Err(DriverError::Timeout(format!("{locator} did not respond")));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.inner.navigate(url).await
    }

    async fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        self.check(locator)?;
        self.inner.click(locator).await
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        self.check(locator)?;
        self.inner.fill(locator, text).await
    }

    async fn select(&self, locator: &Locator, option: &str) -> Result<(), DriverError> {
        self.check(locator)?;
        self.inner.select(locator, option).await
    }

    async fn extract_text(&self, locator: &Locator) -> Result<String, DriverError> {
        self.check(locator)?;
        self.inner.extract_text(locator).await
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        self.check(locator)?;
        self.inner.wait_for(locator, timeout).await
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        self.inner.snapshot().await
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.inner.screenshot().await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.inner.current_url().await
    }

    fn debug_handle(&self) -> DebugHandle {
        self.inner.debug_handle()
    }

    async fn release(&self) -> Result<(), DriverError> {
        self.inner.release().await
    }
}

/// Provider replaying canned answers and recording every call
#[derive(Default)]
pub struct ScriptedProvider {
    suggestions: Mutex<VecDeque<Option<LocatorCandidate>>>,
    actions: Mutex<VecDeque<bool>>,
    calls: Mutex<Vec<(HealingTier, u32)>>,
    handles: Mutex<Vec<DebugHandle>>,
    snapshots: Mutex<Vec<PageSnapshot>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn suggest(self: &Arc<Self>, candidate: Option<LocatorCandidate>) -> Arc<Self> {
        self.suggestions.lock().push_back(candidate);
        self.clone()
    }

    pub fn act(self: &Arc<Self>, success: bool) -> Arc<Self> {
        self.actions.lock().push_back(success);
        self.clone()
    }

    /// `(tier, attempt within tier)` for every call, in order
    pub fn calls(&self) -> Vec<(HealingTier, u32)> {
        self.calls.lock().clone()
    }

    pub fn handles(&self) -> Vec<DebugHandle> {
        self.handles.lock().clone()
    }

    /// Pages handed to `suggest_locator`, in call order
    pub fn snapshots(&self) -> Vec<PageSnapshot> {
        self.snapshots.lock().clone()
    }
}

#[async_trait]
impl HealingProvider for ScriptedProvider {
    async fn suggest_locator(
        &self,
        snapshot: &PageSnapshot,
        request: &HealRequest,
    ) -> Result<Option<LocatorCandidate>, ProviderError> {
        self.calls.lock().push((request.tier, request.attempt));
        self.snapshots.lock().push(snapshot.clone());
        Ok(self.suggestions.lock().pop_front().flatten())
    }

    async fn execute_action(
        &self,
        handle: &DebugHandle,
        request: &HealRequest,
    ) -> Result<bool, ProviderError> {
        self.calls.lock().push((request.tier, request.attempt));
        self.handles.lock().push(handle.clone());
        Ok(self.actions.lock().pop_front().unwrap_or(false))
    }
}
