//! CLI command implementations.

pub mod check;
pub mod decide;
pub mod init_config;
pub mod prune;
pub mod restore;
pub mod run;
pub mod status;
pub mod sweep;
pub mod unblock;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::enforcer::check_root;
use crate::fs_abstraction::RealFileSystem;
use crate::guard::Guard;
use crate::store::JsonBlockStore;

/// Config at `path`, or the defaults when the file does not exist.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path)
}

/// Commands that change packet-filter rules need root unless the configured
/// system type runs without it.
pub(crate) fn require_root(config: &Config) -> Result<()> {
    if config.system().needs_root() {
        check_root()?;
    }
    Ok(())
}

/// Restored engine for a single command, without the periodic sweep.
pub(crate) async fn start_oneshot(config: &Config) -> Result<Guard> {
    let config = Config {
        cleanup_enabled: false,
        ..config.clone()
    };
    Guard::start(&config)
        .await
        .context("Failed to start (is the pathwarden service holding the store?)")
}

/// Read-only view of the store. Takes no lock, so it works while the
/// service is running.
pub(crate) fn read_store(config: &Config) -> Result<JsonBlockStore> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    JsonBlockStore::open_with_fs(&config.storage_file, Box::new(RealFileSystem), clock)
        .with_context(|| format!("Failed to read block store {}", config.storage_file.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_require_root_skipped_for_noop() {
        let config = Config {
            system_type: "noop".to_string(),
            ..Default::default()
        };
        require_root(&config).unwrap();
    }

    #[test]
    fn test_read_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            storage_file: dir.path().join("blocked_ips.json"),
            ..Default::default()
        };
        let store = read_store(&config).unwrap();
        assert!(crate::store::BlockStore::list_all(&store).is_empty());
    }

    #[tokio::test]
    async fn test_start_oneshot_conflicts_with_running_store() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            storage_file: dir.path().join("blocked_ips.json"),
            system_type: "noop".to_string(),
            ..Default::default()
        };

        let first = start_oneshot(&config).await.unwrap();
        let err = start_oneshot(&config).await.err().unwrap();
        assert!(format!("{:#}", err).contains("pathwarden service"));
        first.shutdown().await;
    }
}
