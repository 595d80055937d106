//! Configuration management module
//!
//! `AppConfig` is layered from an optional YAML file and environment
//! variables prefixed with `SELFHEAL__` (double-underscore separated, e.g.
//! `SELFHEAL__HEALING__TIER1_ATTEMPTS=3`).

use action_flow::{HealingConfig, OpenAiProviderConfig};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "SELFHEAL";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub healing: HealingConfig,
    pub engine: EngineConfig,
    pub provider: ProviderSettings,
    pub cache: CacheSettings,
    pub trace: TraceSettings,
}

/// Which browser backend a run is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EngineConfig {
    /// Snapshot fixture file; no browser involved
    Fixture { path: PathBuf },
    /// Existing W3C WebDriver session
    #[serde(rename = "webdriver")]
    WebDriver {
        endpoint: String,
        session_id: String,
        #[serde(default)]
        request_timeout_ms: Option<u64>,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Fixture {
            path: PathBuf::from("fixtures/site.json"),
        }
    }
}

impl EngineConfig {
    pub fn name(&self) -> &'static str {
        match self {
            EngineConfig::Fixture { .. } => "fixture",
            EngineConfig::WebDriver { .. } => "webdriver",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Healing disabled; failing steps exhaust immediately
    #[default]
    Noop,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Rotated on rate limits. Falls back to `api_key_env` when empty.
    pub api_keys: Vec<String>,
    pub api_key_env: String,
    pub model: Option<String>,
    pub api_base: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
    /// Browser agent used for Tier-2 direct actions
    pub agent_endpoint: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Noop,
            api_keys: Vec::new(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: None,
            api_base: None,
            temperature: None,
            timeout_secs: 60,
            agent_endpoint: None,
        }
    }
}

impl ProviderSettings {
    /// Configured keys, else the comma-separated value of `api_key_env`
    pub fn resolved_keys(&self) -> Vec<String> {
        let keys: Vec<String> = self
            .api_keys
            .iter()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .collect();
        if !keys.is_empty() {
            return keys;
        }
        std::env::var(&self.api_key_env)
            .map(|raw| {
                raw.split(',')
                    .map(|key| key.trim().to_string())
                    .filter(|key| !key.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn openai_config(&self) -> OpenAiProviderConfig {
        let defaults = OpenAiProviderConfig::default();
        OpenAiProviderConfig {
            api_keys: self.resolved_keys(),
            model: self.model.clone().unwrap_or(defaults.model),
            api_base: self.api_base.clone().unwrap_or(defaults.api_base),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            agent_endpoint: self.agent_endpoint.clone(),
            max_nodes: defaults.max_nodes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Shared locator cache persisted between runs
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    pub dir: PathBuf,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("traces"),
        }
    }
}

impl AppConfig {
    /// Build from an optional YAML file layered under the environment
    pub fn from_sources(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Yaml),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("provider.api_keys"),
            )
            .build()
            .context("Failed to assemble configuration")?;
        let config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.healing
            .validate()
            .context("Invalid healing configuration")?;
        if let EngineConfig::WebDriver {
            endpoint,
            session_id,
            ..
        } = &self.engine
        {
            if endpoint.trim().is_empty() || session_id.trim().is_empty() {
                bail!("webdriver engine needs both an endpoint and a session_id");
            }
        }
        Ok(())
    }
}
