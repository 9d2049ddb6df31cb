//! Prune command: drop expired records without touching the packet filter.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::clock::SystemClock;
use crate::commands::load_config;
use crate::store::{BlockStore, JsonBlockStore};

/// Run the prune command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = JsonBlockStore::open(&config.storage_file, Arc::new(SystemClock))
        .with_context(|| format!("Failed to open block store {}", config.storage_file.display()))?;

    let removed = store.sweep_expired()?;
    for record in &removed {
        println!("Pruned {}", record.address);
    }
    println!("{} expired records removed", removed.len());

    Ok(())
}
