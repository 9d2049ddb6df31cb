//! Startup reconciliation: re-install packet-filter rules for every address
//! the block store says is still blocked.
//!
//! Rules live in the host firewall, but the enforcer's index of them lives in
//! process memory. After a restart the index is empty; this walks the store
//! once and brings the two back in line.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock, SystemClock};
use crate::enforcer::{create_enforcer, BlockKind, Enforcer, SystemType};
use crate::store::{BlockStore, JsonBlockStore, RecordState};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Tracked-only or already expired records.
    pub skipped: usize,
    pub failed: usize,
}

/// Arm `enforcer` for every record still blocked at `clock.now()`.
///
/// Enforcement errors are logged and counted; they never stop the pass.
pub async fn restore(store: &dyn BlockStore, enforcer: &dyn Enforcer, clock: &dyn Clock) -> RestoreReport {
    let mut report = RestoreReport::default();

    for record in store.list_all() {
        let now = clock.now();
        let (kind, duration) = match (record.state(now), record.blocked_until) {
            (RecordState::Banned, _) => (BlockKind::Ban, std::time::Duration::ZERO),
            (RecordState::Blocked, Some(until)) => (BlockKind::Timeout, clock::remaining(now, until)),
            (state, _) => {
                debug!("Not restoring {} ({})", record.address, state);
                report.skipped += 1;
                continue;
            }
        };

        match enforcer.block(&record.address, kind, duration).await {
            Ok(_) => report.restored += 1,
            Err(e) => {
                warn!("Failed to restore block for {}: {}", record.address, e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Restored {} blocks, skipped {}, failed {}",
        report.restored, report.skipped, report.failed
    );
    report
}

/// Restore from a store file in a standalone process (service pre-start).
pub async fn restore_from_file(path: &Path, system_type: &SystemType) -> Result<RestoreReport> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = JsonBlockStore::open(path, clock.clone())
        .with_context(|| format!("Failed to open block store {}", path.display()))?;
    let enforcer = create_enforcer(system_type, clock.clone());
    Ok(restore(&store, &enforcer, clock.as_ref()).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::enforcer::{Expiry, FirewallEnforcer, MockRuleBackend, NoopBackend};
    use crate::error::GuardError;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn store(dir: &TempDir, clock: Arc<ManualClock>) -> JsonBlockStore {
        JsonBlockStore::open(dir.path().join("blocked_ips.json"), clock).unwrap()
    }

    fn timed(store: &JsonBlockStore, address: &str, until: DateTime<Utc>) {
        store.increment_hit(address, "/.env").unwrap();
        store.set_block(address, Some(until), false, "/.env").unwrap();
    }

    #[tokio::test]
    async fn test_restore_rearms_active_blocks() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(&dir, clock.clone());

        timed(&store, "203.0.113.1", t0() + Duration::minutes(10));
        store.increment_hit("203.0.113.2", "/wp-admin").unwrap();
        store.set_block("203.0.113.2", None, true, "/wp-admin").unwrap();

        let enforcer = FirewallEnforcer::new(Box::new(NoopBackend), clock.clone());
        assert!(!enforcer.is_blocked("203.0.113.1").await);

        let report = restore(&store, &enforcer, clock.as_ref()).await;
        assert_eq!(
            report,
            RestoreReport {
                restored: 2,
                skipped: 0,
                failed: 0
            }
        );
        assert!(enforcer.is_blocked("203.0.113.1").await);
        assert_eq!(
            enforcer.expiry("203.0.113.1").await,
            Some(Expiry::Until(t0() + Duration::minutes(10)))
        );
        assert_eq!(enforcer.expiry("203.0.113.2").await, Some(Expiry::Permanent));
    }

    #[tokio::test]
    async fn test_restore_skips_expired_and_tracked() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(&dir, clock.clone());

        timed(&store, "203.0.113.1", t0() - Duration::minutes(1));
        store.increment_hit("203.0.113.2", "/admin").unwrap();

        let mut backend = MockRuleBackend::new();
        backend.expect_install().never();
        let enforcer = FirewallEnforcer::new(Box::new(backend), clock.clone());

        let report = restore(&store, &enforcer, clock.as_ref()).await;
        assert_eq!(report.restored, 0);
        assert_eq!(report.skipped, 2);
    }

    #[tokio::test]
    async fn test_restore_continues_after_failure() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(t0()));
        let store = store(&dir, clock.clone());

        timed(&store, "203.0.113.1", t0() + Duration::hours(1));
        timed(&store, "203.0.113.2", t0() + Duration::hours(1));

        let mut backend = MockRuleBackend::new();
        backend.expect_install().times(2).returning(|ip| {
            if ip.to_string() == "203.0.113.1" {
                Err(GuardError::enforcement(ip.to_string(), "iptables: Permission denied"))
            } else {
                Ok(())
            }
        });
        let enforcer = FirewallEnforcer::new(Box::new(backend), clock.clone());

        let report = restore(&store, &enforcer, clock.as_ref()).await;
        assert_eq!(report.restored, 1);
        assert_eq!(report.failed, 1);
        assert!(enforcer.is_blocked("203.0.113.2").await);
    }

    #[tokio::test]
    async fn test_restore_from_file_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blocked_ips.json");
        {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let store = JsonBlockStore::open(&path, clock).unwrap();
            timed(&store, "203.0.113.1", Utc::now() + Duration::hours(1));
        }

        let report = restore_from_file(&path, &SystemType::Noop).await.unwrap();
        assert_eq!(report.restored, 1);
    }
}
