//! Locator resolution and the healed-locator cache
//!
//! This crate turns a free-text target description plus an accessibility
//! snapshot into ranked locator candidates:
//! - Exact text, aria-label, placeholder and partial text matching
//! - Role + accessible name matching weighted by uniqueness and depth
//! - Raw CSS / XPath pass-through for selector-like descriptions
//! - A confidence floor separating confirmed from unconfirmed candidates
//!
//! It also owns the per-session [`LocatorCache`] and the cross-run
//! [`SharedLocatorCache`].

pub mod cache;
pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use cache::*;
pub use errors::*;
pub use resolver::*;
pub use strategies::*;
pub use types::*;
