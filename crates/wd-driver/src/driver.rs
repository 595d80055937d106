//! WebDriver-backed [`BrowserDriver`]

use action_primitives::{BrowserDriver, DebugHandle, DriverError, Locator, PageSnapshot};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::errors::{map_transport_error, map_w3c_error, WdError, WdResult};
use crate::mapping::{option_xpath, to_find_request};
use crate::model::{
    element_id, ErrorValue, ExecuteScriptRequest, FindElementRequest, NavigateToUrlRequest,
    RawSnapshot, SendKeysRequest, W3cResponse,
};
use crate::snapshot::{into_snapshot, SNAPSHOT_SCRIPT};

#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// WebDriver server base URL, e.g. `http://localhost:4444`
    pub endpoint: String,
    /// Id of an already-created session
    pub session_id: String,
    pub request_timeout: Duration,
    /// Interval between presence checks in `wait_for`
    pub poll_interval: Duration,
    pub max_snapshot_nodes: usize,
}

impl WebDriverConfig {
    pub fn new(endpoint: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            max_snapshot_nodes: 500,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Driver attached to an existing W3C WebDriver session.
///
/// It never creates or deletes sessions; `release` only detaches.
pub struct WebDriverDriver {
    client: Client,
    endpoint: Url,
    config: WebDriverConfig,
}

impl WebDriverDriver {
    pub fn new(config: WebDriverConfig) -> WdResult<Self> {
        if config.session_id.trim().is_empty() {
            return Err(WdError::MissingSession);
        }
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|_| WdError::InvalidEndpoint(config.endpoint.clone()))?;
        if endpoint.cannot_be_a_base() {
            return Err(WdError::InvalidEndpoint(config.endpoint.clone()));
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| WdError::Client(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    fn session_url(&self, path: &str) -> String {
        format!(
            "{}/session/{}{}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.config.session_id,
            path
        )
    }

    /// Issue one command and unwrap its `value`
    async fn command<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, DriverError> {
        let url = self.session_url(path);
        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| map_transport_error(&err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| map_transport_error(&err))?;
        debug!(%method, path, status = status.as_u16(), "webdriver command");

        let parsed: Option<W3cResponse> = serde_json::from_str(&text).ok();
        if status.is_success() {
            return Ok(parsed.map(|body| body.value).unwrap_or(Value::Null));
        }
        let error = parsed
            .and_then(|body| serde_json::from_value::<ErrorValue>(body.value).ok())
            .unwrap_or_default();
        if error.error.is_empty() {
            return Err(DriverError::Protocol(format!(
                "{method} {path} returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }
        Err(map_w3c_error(&error.error, &error.message))
    }

    async fn get(&self, path: &str) -> Result<Value, DriverError> {
        self.command::<Value>(Method::GET, path, None).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, DriverError> {
        self.command(Method::POST, path, Some(body)).await
    }

    async fn find(&self, request: &FindElementRequest, scope: Option<&str>) -> Result<String, DriverError> {
        let path = match scope {
            Some(parent) => format!("/element/{parent}/element"),
            None => "/element".to_string(),
        };
        let value = self.post(&path, request).await?;
        element_id(&value).ok_or_else(|| {
            DriverError::Protocol(format!("find element returned no reference for {}", request.value))
        })
    }

    async fn find_locator(&self, locator: &Locator) -> Result<String, DriverError> {
        let request = to_find_request(locator)?;
        self.find(&request, None).await
    }

    async fn is_displayed(&self, element: &str) -> Result<bool, DriverError> {
        let value = self.get(&format!("/element/{element}/displayed")).await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

fn expect_string(value: Value, what: &str) -> Result<String, DriverError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(DriverError::Protocol(format!("{what}: expected string, got {other}"))),
    }
}

#[async_trait]
impl BrowserDriver for WebDriverDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        self.post("/url", &NavigateToUrlRequest { url }).await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> Result<(), DriverError> {
        let element = self.find_locator(locator).await?;
        self.post(&format!("/element/{element}/click"), &json!({})).await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str) -> Result<(), DriverError> {
        let element = self.find_locator(locator).await?;
        self.post(&format!("/element/{element}/clear"), &json!({})).await?;
        self.post(&format!("/element/{element}/value"), &SendKeysRequest { text })
            .await?;
        Ok(())
    }

    async fn select(&self, locator: &Locator, option: &str) -> Result<(), DriverError> {
        let element = self.find_locator(locator).await?;
        let option_request = FindElementRequest::xpath(option_xpath(option));
        let option_element = self.find(&option_request, Some(&element)).await?;
        self.post(&format!("/element/{option_element}/click"), &json!({}))
            .await?;
        Ok(())
    }

    async fn extract_text(&self, locator: &Locator) -> Result<String, DriverError> {
        let element = self.find_locator(locator).await?;
        let value = self.get(&format!("/element/{element}/text")).await?;
        expect_string(value, "element text")
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<(), DriverError> {
        let request = to_find_request(locator)?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(&request, None).await {
                Ok(element) => match self.is_displayed(&element).await {
                    Ok(true) => return Ok(()),
                    Ok(false) | Err(DriverError::StaleElement(_)) => {}
                    Err(err) => return Err(err),
                },
                Err(DriverError::ElementNotFound(_)) | Err(DriverError::StaleElement(_)) => {}
                Err(err) => return Err(err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout(format!(
                    "{locator} not visible within {}ms",
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let request = ExecuteScriptRequest {
            script: SNAPSHOT_SCRIPT,
            args: vec![json!(self.config.max_snapshot_nodes)],
        };
        let value = self.post("/execute/sync", &request).await?;
        let raw: RawSnapshot = serde_json::from_value(value)
            .map_err(|err| DriverError::Protocol(format!("malformed snapshot: {err}")))?;
        let snapshot = into_snapshot(raw);
        debug!(url = %snapshot.url, nodes = snapshot.len(), "captured page snapshot");
        Ok(snapshot)
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.get("/screenshot").await?;
        let encoded = expect_string(value, "screenshot")?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| DriverError::Protocol(format!("screenshot is not base64: {err}")))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let value = self.get("/url").await?;
        expect_string(value, "current url")
    }

    fn debug_handle(&self) -> DebugHandle {
        DebugHandle::new(
            self.config.session_id.clone(),
            Some(self.endpoint.as_str().trim_end_matches('/').to_string()),
        )
    }

    async fn release(&self) -> Result<(), DriverError> {
        info!(session_id = %self.config.session_id, "detached from webdriver session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            WebDriverDriver::new(WebDriverConfig::new("http://localhost:4444", " ")),
            Err(WdError::MissingSession)
        ));
        assert!(matches!(
            WebDriverDriver::new(WebDriverConfig::new("not a url", "abc")),
            Err(WdError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn session_paths_and_handle() {
        let driver =
            WebDriverDriver::new(WebDriverConfig::new("http://localhost:4444/", "abc")).unwrap();
        assert_eq!(
            driver.session_url("/element"),
            "http://localhost:4444/session/abc/element"
        );
        let handle = driver.debug_handle();
        assert_eq!(handle.session_id, "abc");
        assert_eq!(handle.endpoint.as_deref(), Some("http://localhost:4444"));
    }
}
