//! Configuration file discovery and validation for the binary.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub use dd_core::config::Config;

/// Locations searched, in order, when no `--config` is given.
const DEFAULT_PATHS: &[&str] = &[
    "./dvrdash.toml",
    "./config.toml",
    "~/.config/dvrdash/config.toml",
    "/etc/dvrdash/config.toml",
];

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::from_path(path)
        .with_context(|| format!("Failed to load config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// First default location that exists, if any.
pub fn find_default_config() -> Option<PathBuf> {
    DEFAULT_PATHS.iter().find_map(|path_str| {
        let path = PathBuf::from(shellexpand::tilde(path_str).as_ref());
        path.exists().then_some(path)
    })
}

/// Load config from `custom_path`, then the default locations, else defaults.
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    match find_default_config() {
        Some(path) => {
            tracing::debug!("Using config file {:?}", path);
            load_config(&path)
        }
        None => Ok(Config::default()),
    }
}

/// Reject configurations the binary cannot run with.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let secs = config.dash.segment_duration_secs;
    if !(secs.is_finite() && secs > 0.0) {
        anyhow::bail!("DASH segment duration must be positive, got {secs}");
    }

    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    Ok(())
}
