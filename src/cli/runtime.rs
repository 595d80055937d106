use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::AppConfig;

/// Install the global subscriber. `RUST_LOG` overrides `level`. Logs go to
/// stderr so command output on stdout stays machine-readable.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(())
}

pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: Option<PathBuf>,
}

/// Explicit path, else `config/selfheal.yaml`, else
/// `~/.config/selfheal/config.yaml`. Only an explicit path must exist.
pub fn resolve_config_path(explicit: Option<&PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        return Ok(Some(path.clone()));
    }

    let local_config = PathBuf::from("config/selfheal.yaml");
    if local_config.exists() {
        return Ok(Some(local_config));
    }

    Ok(dirs::config_dir()
        .map(|mut path| {
            path.push("selfheal");
            path.push("config.yaml");
            path
        })
        .filter(|path| path.exists()))
}

pub fn load_config(explicit: Option<&PathBuf>) -> Result<LoadedConfig> {
    let path = resolve_config_path(explicit)?;
    match &path {
        Some(path) => info!("Loading configuration from: {}", path.display()),
        None => warn!("Config file not found, using defaults and environment"),
    }
    let config = AppConfig::from_sources(path.as_deref())?;
    Ok(LoadedConfig { config, path })
}
