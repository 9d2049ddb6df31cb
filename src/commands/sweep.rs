//! Sweep command implementation.

use anyhow::Result;
use std::path::Path;

use crate::commands::{load_config, require_root, start_oneshot};

/// Run one sweep of expired blocks
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_root(&config)?;

    let guard = start_oneshot(&config).await?;
    let report = guard.engine().sweep().await;
    guard.shutdown().await;

    println!(
        "Removed {} expired records, {} packet-filter rules",
        report.removed, report.rules_cleaned
    );
    if let Some(error) = report.first_error {
        anyhow::bail!("{} removals failed, first error: {}", report.failed, error);
    }
    Ok(())
}
