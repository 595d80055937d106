//! Browser driver surface
//!
//! The engine never launches or kills browsers. A driver is attached to an
//! existing session and exposes the handful of primitives a step needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{errors::DriverError, snapshot::PageSnapshot, types::Locator};

/// Remote-debugging handle for the live session.
///
/// Handed to the healing provider for Tier-2 so it can act inside the same
/// browser connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugHandle {
    pub session_id: String,
    /// Remote endpoint (e.g. WebDriver base URL); None for in-process drivers
    pub endpoint: Option<String>,
}

impl DebugHandle {
    pub fn new(session_id: impl Into<String>, endpoint: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            endpoint,
        }
    }
}

/// Browser driver trait
///
/// Every call is a suspension point. Only [`DriverError::SessionLost`] is
/// fatal; other errors describe one failed primitive.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Click an element
    async fn click(&self, locator: &Locator) -> Result<(), DriverError>;

    /// Replace the contents of an input field
    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError>;

    /// Select an option from a dropdown
    async fn select(&self, locator: &Locator, option: &str) -> Result<(), DriverError>;

    /// Read the visible text of an element
    async fn extract_text(&self, locator: &Locator) -> Result<String, DriverError>;

    /// Wait until an element is present and visible
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError>;

    /// Capture the accessibility tree of the current page
    async fn snapshot(&self) -> Result<PageSnapshot, DriverError>;

    /// Capture a PNG screenshot
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// URL of the current page
    async fn current_url(&self) -> Result<String, DriverError>;

    fn debug_handle(&self) -> DebugHandle;

    /// Detach from the session. The browser itself stays alive.
    async fn release(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
