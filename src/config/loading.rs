//! Configuration loading functionality.
//!
//! Resolves the config path, creates a default file when none exists, and
//! parses plus validates the TOML.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::Config;
use super::builder::create_default_config;
use super::validation::validate_config;
use crate::common::constants::*;

/// Global configuration directory, set once at startup
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration directory for the current process.
/// This can only be called once, typically at startup.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration directory already set"))
}

/// Get the custom configuration directory if one was set.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().and_then(|d| d.clone())
}

/// Path of `adaptive-light.toml`, honoring `--config`.
pub fn get_config_path() -> Result<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return Ok(custom_dir.join(CONFIG_FILE_NAME));
    }
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Load configuration using automatic path detection.
///
/// Creates a default configuration file if none exists.
pub fn load() -> Result<Config> {
    let config_path = get_config_path()?;

    if !config_path.exists() {
        create_default_config(&config_path).with_context(|| {
            format!(
                "Failed to create default config at {}",
                config_path.display()
            )
        })?;
        log_block_start!("Created default config: {}", config_path.display());
    }

    load_from_path(&config_path)
}

/// Load and validate a configuration file at an explicit path.
pub fn load_from_path(path: &PathBuf) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found at {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    parse_config(&content, path)
}

/// Parse and validate TOML content; `origin` only appears in error messages.
pub fn parse_config(content: &str, origin: &Path) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .with_context(|| format!("Failed to parse config from {}", origin.display()))?;

    validate_config(&config)
        .with_context(|| format!("Invalid configuration in {}", origin.display()))?;

    Ok(config)
}
