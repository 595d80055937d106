//! Engine and provider construction from configuration

use action_flow::{HealingProvider, NoopHealingProvider, OpenAiHealingProvider};
use action_primitives::{BrowserDriver, FixtureDriver};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wd_driver::{WebDriverConfig, WebDriverDriver};

use crate::config::{EngineConfig, ProviderKind, ProviderSettings};

/// Resolve the configured engine into one driver for the run
pub fn build_driver(engine: &EngineConfig) -> Result<Arc<dyn BrowserDriver>> {
    match engine {
        EngineConfig::Fixture { path } => {
            let driver = FixtureDriver::from_path(path)
                .with_context(|| format!("Failed to load fixture {}", path.display()))?;
            info!(engine = "fixture", path = %path.display(), "driver ready");
            Ok(Arc::new(driver))
        }
        EngineConfig::WebDriver {
            endpoint,
            session_id,
            request_timeout_ms,
        } => {
            let mut config = WebDriverConfig::new(endpoint.clone(), session_id.clone());
            if let Some(timeout) = request_timeout_ms {
                config = config.with_request_timeout(Duration::from_millis(*timeout));
            }
            let driver = WebDriverDriver::new(config).context("Failed to attach WebDriver")?;
            info!(engine = "webdriver", %endpoint, %session_id, "driver ready");
            Ok(Arc::new(driver))
        }
    }
}

pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn HealingProvider>> {
    match settings.kind {
        ProviderKind::Noop => {
            info!("healing provider disabled");
            Ok(Arc::new(NoopHealingProvider))
        }
        ProviderKind::OpenAi => {
            let config = settings.openai_config();
            info!(
                model = %config.model,
                keys = config.api_keys.len(),
                tier2 = config.agent_endpoint.is_some(),
                "using OpenAI healing provider"
            );
            let provider =
                OpenAiHealingProvider::new(config).context("Failed to configure OpenAI provider")?;
            Ok(Arc::new(provider))
        }
    }
}
