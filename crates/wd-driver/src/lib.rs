//! W3C WebDriver driver
//!
//! Attaches to a session that something else created (a Selenium grid,
//! chromedriver, geckodriver) and implements the engine's `BrowserDriver`
//! surface over the WebDriver HTTP protocol.

pub mod driver;
pub mod errors;
pub mod mapping;
pub mod model;
pub mod snapshot;

pub use driver::{WebDriverConfig, WebDriverDriver};
pub use errors::{map_w3c_error, WdError, WdResult};
pub use mapping::to_find_request;
