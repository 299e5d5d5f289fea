pub mod deploy;
pub mod serve;

use anyhow::{Context, Result};
use sitedrop_core::ServerConfig;
use std::path::Path;

/// Defaults, then the optional config file, then the environment.
/// Command-line overrides are applied by each command afterwards.
fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
    match path {
        Some(path) => ServerConfig::load(Some(path))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ServerConfig::load(None).context("Failed to load configuration"),
    }
}
