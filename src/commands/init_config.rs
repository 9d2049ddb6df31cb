//! Init-config command implementation.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::info;

use crate::config::Config;

/// Write the commented default configuration to `config_path`
pub async fn run(force: bool, config_path: &Path) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to overwrite it.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
    }

    info!("Creating {}...", config_path.display());
    fs::write(config_path, Config::generate_default_yaml()).context("Failed to write config file")?;
    fs::set_permissions(config_path, fs::Permissions::from_mode(0o644))
        .context("Failed to set config permissions")?;

    println!("Wrote default configuration to {}", config_path.display());
    Ok(())
}
