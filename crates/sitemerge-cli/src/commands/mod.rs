//! CLI command implementations

pub mod export;
pub mod init;
pub mod projects;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use sitemerge_core::Config;

/// Load the configuration at `path`, or defaults when there is none
pub(crate) fn load_or_default(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        tracing::debug!("no configuration at {}, using defaults", path);
        return Ok(Config::default());
    }
    Config::load(path).with_context(|| format!("Failed to load configuration from {path}"))
}
