//! Shared primitives for the selfheal engine crates.
//!
//! Everything here is deliberately small: run/session identifiers, the step
//! fingerprint used as cache and correlation key, and a shared error type.

mod fingerprint;

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub use fingerprint::{parse_page_url, url_template, StepFingerprint};

/// Shared error type for the lower layers.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
