//! Restore command implementation.

use anyhow::Result;
use std::path::Path;

use crate::commands::{load_config, require_root};
use crate::restore::restore_from_file;

/// Re-arm the packet filter from the block store
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_root(&config)?;

    let report = restore_from_file(&config.storage_file, &config.system()).await?;

    println!(
        "Restored {} blocks ({} skipped, {} failed)",
        report.restored, report.skipped, report.failed
    );
    if report.failed > 0 {
        eprintln!("Some rules could not be installed, see the log above for details");
    }

    Ok(())
}
