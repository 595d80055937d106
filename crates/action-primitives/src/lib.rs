//! Action primitives - the data model and driver surface of the engine
//!
//! This crate provides the building blocks every other layer speaks:
//! - Action steps (navigate, click, fill, select, extract, wait, screenshot)
//! - Locators and ranked locator candidates
//! - Per-attempt execution results and append-only healing events
//! - Accessibility-tree page snapshots
//! - The narrow `BrowserDriver` trait and a fixture-backed implementation

pub mod driver;
pub mod errors;
pub mod fixture;
pub mod report;
pub mod snapshot;
pub mod types;

pub use driver::*;
pub use errors::*;
pub use fixture::*;
pub use report::*;
pub use snapshot::*;
pub use types::*;
