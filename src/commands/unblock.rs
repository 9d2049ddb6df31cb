//! Unblock command implementation.

use anyhow::Result;
use std::path::Path;

use crate::commands::{load_config, require_root, start_oneshot};

/// Lift a block. Rules are restored first so the enforcer knows which one
/// to remove.
pub async fn run(ip: &str, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_root(&config)?;

    let guard = start_oneshot(&config).await?;
    let result = guard.engine().unblock(ip).await;
    guard.shutdown().await;

    if result? {
        println!("Unblocked {}", ip);
    } else {
        println!("{} was not blocked", ip);
    }
    Ok(())
}
