//! Decide command: evaluate one request as if it had reached the server.

use anyhow::Result;
use std::path::Path;

use crate::commands::{load_config, require_root, start_oneshot};
use crate::engine::Verdict;

/// Run the decide command
pub async fn run(ip: &str, path: &str, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    require_root(&config)?;

    let guard = start_oneshot(&config).await?;
    let decision = guard.decide(ip, path).await;

    match decision.verdict {
        Verdict::Block => println!("BLOCK {} {}", ip, path),
        Verdict::Allow => println!("ALLOW {} {}", ip, path),
    }
    for fault in &decision.faults {
        eprintln!("  warning: {}", fault);
    }

    guard.shutdown().await;
    Ok(())
}
