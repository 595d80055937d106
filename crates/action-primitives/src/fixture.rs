//! Fixture-backed driver
//!
//! Serves a static site described by page snapshots. An action succeeds iff
//! its locator matches a visible node on the current page. Used for dry runs
//! and for verifying generated plans without a browser.

use async_trait::async_trait;
use parking_lot::RwLock;
use selfheal_core_types::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{
    driver::{BrowserDriver, DebugHandle},
    errors::DriverError,
    snapshot::PageSnapshot,
    types::Locator,
};

const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

/// On-disk fixture format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureSite {
    /// Page loaded before the first navigation; defaults to the first page
    #[serde(default)]
    pub start_url: Option<String>,
    pub pages: Vec<PageSnapshot>,
}

struct FixtureState {
    pages: HashMap<String, PageSnapshot>,
    current: String,
    released: bool,
}

/// Driver over a [`FixtureSite`]
pub struct FixtureDriver {
    session_id: String,
    state: RwLock<FixtureState>,
}

impl FixtureDriver {
    pub fn new(site: FixtureSite) -> Self {
        let current = site
            .start_url
            .clone()
            .or_else(|| site.pages.first().map(|page| page.url.clone()))
            .unwrap_or_else(|| "about:blank".to_string());
        let pages = site
            .pages
            .into_iter()
            .map(|mut page| {
                page.reindex();
                (page_key(&page.url), page)
            })
            .collect();
        Self {
            session_id: format!("fixture-{}", SessionId::new()),
            state: RwLock::new(FixtureState {
                pages,
                current,
                released: false,
            }),
        }
    }

    /// Parse a fixture from JSON text
    pub fn from_json(raw: &str) -> Result<Self, DriverError> {
        let site: FixtureSite = serde_json::from_str(raw)
            .map_err(|err| DriverError::Protocol(format!("invalid fixture: {}", err)))?;
        Ok(Self::new(site))
    }

    /// Load a fixture file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DriverError::Protocol(format!("cannot read fixture {}: {}", path.display(), err))
        })?;
        Self::from_json(&raw)
    }

    /// Mutate a page in place, e.g. to simulate a redesign between runs
    pub fn update_page<F>(&self, url: &str, update: F) -> bool
    where
        F: FnOnce(&mut PageSnapshot),
    {
        let mut state = self.state.write();
        match state.pages.get_mut(&page_key(url)) {
            Some(page) => {
                update(page);
                page.reindex();
                true
            }
            None => false,
        }
    }

    fn ensure_live(state: &FixtureState) -> Result<(), DriverError> {
        if state.released {
            return Err(DriverError::SessionLost("fixture session released".to_string()));
        }
        Ok(())
    }

    fn current_page(state: &FixtureState) -> Result<&PageSnapshot, DriverError> {
        Self::ensure_live(state)?;
        state
            .pages
            .get(&page_key(&state.current))
            .ok_or_else(|| DriverError::Protocol(format!("no fixture page for {}", state.current)))
    }

    fn locate(state: &FixtureState, locator: &Locator) -> Result<usize, DriverError> {
        let page = Self::current_page(state)?;
        page.first(locator)
            .map(|node| node.index)
            .ok_or_else(|| DriverError::ElementNotFound(locator.to_string()))
    }
}

#[async_trait]
impl BrowserDriver for FixtureDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.write();
        Self::ensure_live(&state)?;
        if !state.pages.contains_key(&page_key(url)) {
            return Err(DriverError::Protocol(format!("no fixture page for {}", url)));
        }
        debug!(url, "fixture navigate");
        state.current = url.to_string();
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        let mut state = self.state.write();
        let index = Self::locate(&state, locator)?;
        let target = Self::current_page(&state)?.nodes[index].navigates_to.clone();
        if let Some(url) = target {
            debug!(url = %url, "fixture click follows link");
            state.current = url;
        }
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.write();
        let index = Self::locate(&state, locator)?;
        let key = page_key(&state.current);
        if let Some(page) = state.pages.get_mut(&key) {
            page.nodes[index].value = Some(text.to_string());
        }
        Ok(())
    }

    async fn select(&self, locator: &Locator, option: &str) -> Result<(), DriverError> {
        self.fill(locator, option).await
    }

    async fn extract_text(&self, locator: &Locator) -> Result<String, DriverError> {
        let state = self.state.read();
        let index = Self::locate(&state, locator)?;
        let node = &Self::current_page(&state)?.nodes[index];
        Ok(node.label_text().to_string())
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        // Fixture pages never change on their own, so there is nothing to poll.
        let state = self.state.read();
        Self::locate(&state, locator).map(|_| ()).map_err(|err| match err {
            DriverError::ElementNotFound(what) => DriverError::Timeout(format!(
                "{} not visible within {}ms",
                what,
                timeout.as_millis()
            )),
            other => other,
        })
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let state = self.state.read();
        let mut page = Self::current_page(&state)?.clone();
        page.url = state.current.clone();
        page.captured_at = chrono::Utc::now();
        Ok(page)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let state = self.state.read();
        Self::current_page(&state)?;
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(state.current.as_bytes());
        Ok(bytes)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let state = self.state.read();
        Self::ensure_live(&state)?;
        Ok(state.current.clone())
    }

    fn debug_handle(&self) -> DebugHandle {
        DebugHandle::new(self.session_id.clone(), None)
    }

    async fn release(&self) -> Result<(), DriverError> {
        self.state.write().released = true;
        Ok(())
    }
}

fn page_key(url: &str) -> String {
    let trimmed = url.trim();
    let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
    trimmed[..end].trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AxNode;

    fn site() -> FixtureSite {
        FixtureSite {
            start_url: None,
            pages: vec![
                PageSnapshot::new(
                    "https://shop.test/",
                    "Home",
                    vec![AxNode::new("link", "Products")
                        .with_text("Products")
                        .with_navigation("https://shop.test/products")],
                ),
                PageSnapshot::new(
                    "https://shop.test/products",
                    "Products",
                    vec![
                        AxNode::new("textbox", "Search").with_placeholder("Search products"),
                        AxNode::new("heading", "All products").with_text("All products"),
                    ],
                ),
            ],
        }
    }

    #[tokio::test]
    async fn click_follows_links() {
        let driver = FixtureDriver::new(site());
        driver.click(&Locator::exact_text("Products")).await.unwrap();
        assert_eq!(driver.current_url().await.unwrap(), "https://shop.test/products");
        let heading = driver
            .extract_text(&Locator::role_name("heading", "All products"))
            .await
            .unwrap();
        assert_eq!(heading, "All products");
    }

    #[tokio::test]
    async fn missing_elements_are_not_fatal() {
        let driver = FixtureDriver::new(site());
        let err = driver.click(&Locator::exact_text("Checkout")).await.unwrap_err();
        assert!(matches!(err, DriverError::ElementNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn fill_is_visible_in_next_snapshot() {
        let driver = FixtureDriver::new(site());
        driver.navigate("https://shop.test/products?ref=home").await.unwrap();
        driver
            .fill(&Locator::placeholder("Search products"), "lamp")
            .await
            .unwrap();
        let page = driver.snapshot().await.unwrap();
        assert_eq!(page.nodes[0].value.as_deref(), Some("lamp"));
    }

    #[tokio::test]
    async fn released_session_is_lost() {
        let driver = FixtureDriver::new(site());
        driver.release().await.unwrap();
        let err = driver.snapshot().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn redesigned_page_breaks_old_locator() {
        let driver = FixtureDriver::new(site());
        driver.navigate("https://shop.test/products").await.unwrap();
        let renamed = driver.update_page("https://shop.test/products", |page| {
            page.nodes[1] = AxNode::new("heading", "Catalogue").with_text("Catalogue");
        });
        assert!(renamed);
        let err = driver
            .extract_text(&Locator::exact_text("All products"))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::ElementNotFound(_)));
        assert!(!driver.update_page("https://shop.test/cart", |_| {}));
    }

    #[test]
    fn parses_fixture_json() {
        let raw = r#"{"pages":[{"url":"https://a.test/","nodes":[{"role":"button","name":"Go"}]}]}"#;
        let driver = FixtureDriver::from_json(raw).unwrap();
        let page = tokio_test::block_on(driver.snapshot()).unwrap();
        assert!(page.nodes[0].visible);
        assert_eq!(page.nodes[0].role, "button");
    }
}
