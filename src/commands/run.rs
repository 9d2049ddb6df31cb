//! Run command: keep pathwarden's blocks enforced until a signal arrives.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::commands::{load_config, require_root};
use crate::guard::Guard;
use crate::signal::ShutdownGuard;

/// Run the service loop
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_root(&config)?;

    let shutdown = ShutdownGuard::new();
    let token = shutdown.token();

    let guard = Guard::start(&config).await?;
    let report = guard.restore_report();
    info!(
        "pathwarden running for {} ({} blocks restored, {} failed)",
        config.system(),
        report.restored,
        report.failed
    );

    token.cancelled().await;
    guard.shutdown().await;

    Ok(())
}
