//! Configuration module
//!
//! Merges the command-line arguments over the monitor's environment
//! configuration.

use anyhow::{Context, Result};
use qprobe_monitor::Config;
use std::path::PathBuf;
use tracing::debug;

/// Builds and validates the monitor configuration
pub fn load(url: String, csrf_token: Option<String>, history_path: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::from_env_with_base_url(url);

    if csrf_token.is_some() {
        config.csrf_token = csrf_token;
    }
    if history_path.is_some() {
        config.history_path = history_path;
    }

    config.validate().context("Invalid configuration")?;
    debug!(base_url = %config.base_url, history = ?config.history_path, "Loaded configuration");
    Ok(config)
}
