//! Error types for the locator system

use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Nothing to resolve
    #[error("Empty target description")]
    EmptyDescription,

    /// Snapshot contained no usable candidate
    #[error("No candidates for '{0}'")]
    NoCandidates(String),

    /// Reading or writing the shared cache file failed
    #[error("Cache persistence failed for {path}: {reason}")]
    CachePersistence { path: String, reason: String },

    /// Cache file contents could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, LocatorError::NoCandidates(_))
    }

    /// Get error severity (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            LocatorError::CachePersistence { .. } | LocatorError::Serialization(_) => 2,
            LocatorError::NoCandidates(_) => 1,
            LocatorError::EmptyDescription => 0,
        }
    }
}
