//! Error types for browser driver operations

use thiserror::Error;

/// Errors surfaced by a [`crate::BrowserDriver`].
///
/// Only [`DriverError::SessionLost`] is fatal. Everything else is an expected
/// per-attempt failure that the executor turns into a structured result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// Element could not be located with the given locator
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Element reference became detached from the DOM
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Driver-side timeout
    #[error("Driver timeout: {0}")]
    Timeout(String),

    /// Locator could not be translated for this backend
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Browser crashed, disconnected, or the session id is gone
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// Protocol or transport error that did not kill the session
    #[error("Driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Check if the error must abort the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionLost(_))
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            DriverError::SessionLost(_) => 3,
            DriverError::Protocol(_) => 2,
            DriverError::Timeout(_)
            | DriverError::ElementNotFound(_)
            | DriverError::StaleElement(_) => 1,
            DriverError::InvalidLocator(_) => 0,
        }
    }
}
