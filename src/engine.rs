//! Policy engine: turns "this address asked for this path" into a verdict.
//!
//! The engine is the only component that writes to both the block store and
//! the enforcer. Per address, the whole check-count-block sequence runs
//! under one async lock, so concurrent requests from the same address cannot
//! both slip under the grace period or install two blocks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::{self, Clock};
use crate::enforcer::{BlockKind, Enforcer};
use crate::error::{GuardError, GuardResult};
use crate::keyed_lock::KeyedLocks;
use crate::matcher::PatternMatcher;
use crate::store::{BlockRecord, BlockStore};
use crate::validation::{format_interval, parse_address};

/// How the timeout grows with each repeated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    /// `base * (n + 1)`
    #[default]
    Linear,
    /// `base * 2^n`
    Geometric,
}

impl std::fmt::Display for Escalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Escalation::Linear => f.write_str("linear"),
            Escalation::Geometric => f.write_str("geometric"),
        }
    }
}

/// Duration of the block applied after `previous_blocks` earlier ones.
/// Saturates at [`Duration::MAX`].
///
/// # Examples
/// ```
/// use pathwarden::engine::{calculate_timeout, Escalation};
/// use std::time::Duration;
/// let hour = Duration::from_secs(3600);
/// assert_eq!(calculate_timeout(hour, Escalation::Linear, 0), hour);
/// assert_eq!(calculate_timeout(hour, Escalation::Linear, 2), hour * 3);
/// assert_eq!(calculate_timeout(hour, Escalation::Geometric, 3), hour * 8);
/// ```
pub fn calculate_timeout(base: Duration, escalation: Escalation, previous_blocks: u32) -> Duration {
    match escalation {
        Escalation::Linear => base.saturating_mul(previous_blocks.saturating_add(1)),
        Escalation::Geometric => match 1u32.checked_shl(previous_blocks) {
            Some(factor) => base.saturating_mul(factor),
            None => Duration::MAX,
        },
    }
}

/// Policy knobs, taken from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Suspicious hits tolerated before the first block.
    pub grace_period: u32,
    /// When false, exceeding the grace period bans permanently.
    pub timeout_enabled: bool,
    pub timeout_duration: Duration,
    pub escalation: Escalation,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            grace_period: 3,
            timeout_enabled: true,
            timeout_duration: Duration::from_secs(24 * 3600),
            escalation: Escalation::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Block,
}

/// Verdict for one request plus everything that went wrong on the way.
///
/// Faults never change the verdict: a block that could not be installed in
/// the packet filter is still a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    pub faults: Vec<GuardError>,
}

impl Decision {
    fn allow(faults: Vec<GuardError>) -> Self {
        Self {
            verdict: Verdict::Allow,
            faults,
        }
    }

    fn block(faults: Vec<GuardError>) -> Self {
        Self {
            verdict: Verdict::Block,
            faults,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }
}

/// Result of one sweep pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Expired records deleted, with their rules.
    pub removed: usize,
    /// Leftover enforcement entries cleaned by the enforcer itself.
    pub rules_cleaned: usize,
    pub failed: usize,
    pub first_error: Option<GuardError>,
}

impl SweepReport {
    fn fail(&mut self, error: GuardError) {
        self.failed += 1;
        self.first_error.get_or_insert(error);
    }
}

/// Decides per request and keeps the store and the enforcer in step.
pub struct PolicyEngine {
    store: Arc<dyn BlockStore>,
    enforcer: Arc<dyn Enforcer>,
    matcher: PatternMatcher,
    settings: EngineSettings,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<String>,
}

impl PolicyEngine {
    pub fn new(
        store: Arc<dyn BlockStore>,
        enforcer: Arc<dyn Enforcer>,
        matcher: PatternMatcher,
        settings: EngineSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            enforcer,
            matcher,
            settings,
            clock,
            locks: KeyedLocks::default(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Decide whether a request from `address` for `path` goes through.
    pub async fn decide(&self, address: &str, path: &str) -> Decision {
        let ip = match parse_address(address) {
            Ok(ip) => ip,
            Err(e) => {
                debug!("Letting request through: {}", e);
                return Decision::allow(vec![e]);
            }
        };
        let address = ip.to_string();

        if self.matcher.is_whitelisted(&address) {
            return Decision::allow(Vec::new());
        }

        let _lock = self.locks.lock(&address).await;
        let now = self.clock.now();
        let mut faults = Vec::new();

        if let Some(record) = self.store.get(&address).filter(|r| r.is_blocked_at(now)) {
            self.rearm(&record, &mut faults).await;
            debug!("Blocked request from {} to {}", address, path);
            return Decision::block(faults);
        }
        if self.enforcer.is_blocked(&address).await {
            debug!("Blocked request from {} to {} (enforcer only)", address, path);
            return Decision::block(faults);
        }

        if !self.matcher.is_suspicious(path) {
            return Decision::allow(faults);
        }

        let hit = {
            let (address, path) = (address.clone(), path.to_string());
            self.store_write(move |store| store.increment_hit(&address, &path)).await
        };
        let record = match hit {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to record hit from {}: {}", address, e);
                faults.push(e);
                match self.store.get(&address) {
                    Some(record) => record,
                    None => return Decision::allow(faults),
                }
            }
        };

        if u64::from(self.settings.grace_period) >= record.request_count {
            debug!(
                "Suspicious request from {} to {} ({}/{})",
                address, path, record.request_count, self.settings.grace_period
            );
            return Decision::allow(faults);
        }

        self.block(&record, path, &mut faults).await;
        Decision::block(faults)
    }

    /// Re-issue the enforcement call for a record that is still blocked.
    /// Covers the enforcer having lost its index in a restart.
    async fn rearm(&self, record: &BlockRecord, faults: &mut Vec<GuardError>) {
        let (kind, duration) = match record.blocked_until {
            _ if record.is_permanent => (BlockKind::Ban, Duration::ZERO),
            Some(until) => (BlockKind::Timeout, clock::remaining(self.clock.now(), until)),
            None => return,
        };
        if let Err(e) = self.enforcer.block(&record.address, kind, duration).await {
            warn!("Failed to re-arm block for {}: {}", record.address, e);
            faults.push(e);
        }
    }

    async fn block(&self, record: &BlockRecord, path: &str, faults: &mut Vec<GuardError>) {
        let address = record.address.as_str();

        if self.settings.timeout_enabled {
            let duration = calculate_timeout(
                self.settings.timeout_duration,
                self.settings.escalation,
                record.timeout_count,
            );
            let until = clock::add_duration(self.clock.now(), duration);

            if let Err(e) = self.enforcer.block(address, BlockKind::Timeout, duration).await {
                warn!("Failed to enforce block for {}: {}", address, e);
                faults.push(e);
            }
            let persisted = {
                let (address, path) = (address.to_string(), path.to_string());
                self.store_write(move |store| store.set_timed_block(&address, until, &path)).await
            };
            if let Err(e) = persisted {
                warn!("Failed to persist block for {}: {}", address, e);
                faults.push(e);
            }

            info!(
                "Blocked {} for {} after {} suspicious requests (block #{}, last path {})",
                address,
                format_interval(duration),
                record.request_count,
                record.timeout_count.saturating_add(1),
                path
            );
        } else {
            if let Err(e) = self.enforcer.block(address, BlockKind::Ban, Duration::ZERO).await {
                warn!("Failed to enforce ban for {}: {}", address, e);
                faults.push(e);
            }
            let persisted = {
                let (address, path) = (address.to_string(), path.to_string());
                self.store_write(move |store| store.set_block(&address, None, true, &path)).await
            };
            if let Err(e) = persisted {
                warn!("Failed to persist ban for {}: {}", address, e);
                faults.push(e);
            }

            info!(
                "Banned {} permanently after {} suspicious requests (last path {})",
                address, record.request_count, path
            );
        }
    }

    /// Lift any block on `address` and forget its history. Returns whether a
    /// record existed.
    pub async fn unblock(&self, address: &str) -> GuardResult<bool> {
        let address = parse_address(address)?.to_string();
        let _lock = self.locks.lock(&address).await;

        self.enforcer.unblock(&address).await?;
        let removed = {
            let address = address.clone();
            self.store_write(move |store| store.delete(&address)).await?
        };

        if removed.is_some() {
            info!("Unblocked {}", address);
        } else {
            debug!("No block record for {}", address);
        }
        Ok(removed.is_some())
    }

    /// Remove every expired block from the enforcer and the store.
    pub async fn sweep(&self) -> SweepReport {
        let candidates: Vec<String> = {
            let now = self.clock.now();
            self.store
                .list_all()
                .into_iter()
                .filter(|r| r.is_expired(now))
                .map(|r| r.address)
                .collect()
        };

        let mut report = SweepReport::default();
        for address in candidates {
            let _lock = self.locks.lock(&address).await;

            // A request may have re-blocked the address since the listing
            let still_expired = self
                .store
                .get(&address)
                .is_some_and(|r| r.is_expired(self.clock.now()));
            if !still_expired {
                continue;
            }

            if let Err(e) = self.enforcer.unblock(&address).await {
                warn!("Failed to lift expired block for {}: {}", address, e);
                report.fail(e);
                continue;
            }
            let deleted = {
                let address = address.clone();
                self.store_write(move |store| store.delete(&address)).await
            };
            match deleted {
                Ok(_) => {
                    debug!("Removed expired block for {}", address);
                    report.removed += 1;
                }
                Err(e) => {
                    warn!("Failed to delete expired record for {}: {}", address, e);
                    report.fail(e);
                }
            }
        }

        match self.enforcer.cleanup_expired().await {
            Ok(cleaned) => report.rules_cleaned = cleaned,
            Err(e) => {
                warn!("Enforcer cleanup failed: {}", e);
                report.fail(e);
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                "Sweep removed {} expired blocks ({} failures)",
                report.removed, report.failed
            );
        }
        report
    }

    /// Run a store mutation on the blocking pool. Mutations flush and fsync
    /// the store file, which must not stall the runtime's workers.
    async fn store_write<T, F>(&self, op: F) -> GuardResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn BlockStore) -> GuardResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&*store))
            .await
            .map_err(|e| GuardError::Persistence(format!("Store task failed: {}", e)))?
    }

    pub fn record(&self, address: &str) -> Option<BlockRecord> {
        let address = parse_address(address).ok()?.to_string();
        self.store.get(&address)
    }

    pub fn records(&self) -> Vec<BlockRecord> {
        self.store.list_all()
    }
}
