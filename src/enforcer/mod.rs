//! Packet-filter enforcement (iptables, pfctl, netsh).
//!
//! [`FirewallEnforcer`] keeps an in-memory index of the addresses it has
//! installed drop rules for and delegates the actual rule commands to one
//! platform [`RuleBackend`]. The index is the only thing `is_blocked` looks
//! at; the host firewall is never queried on the request path.

mod iptables;
mod netsh;
mod noop;
mod pfctl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use iptables::IptablesBackend;
pub use netsh::NetshBackend;
pub use noop::{NoopBackend, UnsupportedBackend};
pub use pfctl::PfctlBackend;

use crate::clock::{self, Clock};
use crate::cmd_abstraction::{CommandExecutor, CommandOutput, RealCommandExecutor};
use crate::error::{GuardError, GuardResult};
use crate::keyed_lock::KeyedLocks;
use crate::validation::parse_address;

/// What kind of block to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Timed block, lifted after the given duration.
    Timeout,
    /// Permanent block.
    Ban,
}

/// When an enforcement entry stops applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Permanent,
    Until(DateTime<Utc>),
}

impl Expiry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Expiry::Permanent => false,
            Expiry::Until(until) => now > *until,
        }
    }
}

/// Effect of a [`Enforcer::block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// No rule existed; the OS rule was installed.
    Installed,
    /// A rule existed; its expiry was pushed out or made permanent.
    Extended,
    /// An equal or stronger block was already in place.
    Unchanged,
}

/// Address-level enforcement at the host packet filter.
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Install or refresh a drop rule. `duration` is ignored for [`BlockKind::Ban`].
    async fn block(&self, address: &str, kind: BlockKind, duration: Duration) -> GuardResult<BlockOutcome>;

    /// Remove the drop rule. A no-op for addresses without one.
    async fn unblock(&self, address: &str) -> GuardResult<()>;

    /// Index lookup with lazy expiry.
    async fn is_blocked(&self, address: &str) -> bool;

    async fn expiry(&self, address: &str) -> Option<Expiry>;

    /// Remove every expired rule. Returns how many were removed.
    async fn cleanup_expired(&self) -> GuardResult<usize>;
}

/// Platform-specific rule commands for a single address.
#[cfg_attr(test, mockall::automock)]
pub trait RuleBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Install the inbound and outbound drop rules. Must not duplicate rules
    /// that are already present.
    fn install(&self, ip: IpAddr) -> GuardResult<()>;

    /// Remove the rules installed by [`RuleBackend::install`].
    fn remove(&self, ip: IpAddr) -> GuardResult<()>;
}

/// Packet filter family to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemType {
    Linux,
    Darwin,
    Windows,
    Noop,
    Unknown(String),
}

impl SystemType {
    /// Parse a configured system type. `auto` resolves to the running OS.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Self::detect(),
            "linux" => Self::Linux,
            "darwin" | "mac" | "macos" => Self::Darwin,
            "windows" => Self::Windows,
            "noop" | "none" => Self::Noop,
            _ => Self::Unknown(value.trim().to_string()),
        }
    }

    /// The system type matching the OS this binary runs on.
    pub fn detect() -> Self {
        match std::env::consts::OS {
            "linux" => Self::Linux,
            "macos" => Self::Darwin,
            "windows" => Self::Windows,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Whether installing rules for this system type needs root.
    pub fn needs_root(&self) -> bool {
        matches!(self, Self::Linux | Self::Darwin)
    }
}

impl std::fmt::Display for SystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemType::Linux => f.write_str("linux"),
            SystemType::Darwin => f.write_str("darwin"),
            SystemType::Windows => f.write_str("windows"),
            SystemType::Noop => f.write_str("noop"),
            SystemType::Unknown(name) => write!(f, "{} (unsupported)", name),
        }
    }
}

/// Create the rule backend for a system type.
pub fn create_backend(system_type: &SystemType, executor: Arc<dyn CommandExecutor>) -> Box<dyn RuleBackend> {
    match system_type {
        SystemType::Linux => Box::new(IptablesBackend::new(executor)),
        SystemType::Darwin => Box::new(PfctlBackend::new(executor)),
        SystemType::Windows => Box::new(NetshBackend::new(executor)),
        SystemType::Noop => Box::new(NoopBackend),
        SystemType::Unknown(name) => {
            warn!(
                "Unsupported system type '{}': blocks are recorded but not enforced",
                name
            );
            Box::new(UnsupportedBackend::new(name.clone()))
        }
    }
}

/// Create an enforcer that runs real system commands.
pub fn create_enforcer(system_type: &SystemType, clock: Arc<dyn Clock>) -> FirewallEnforcer {
    let backend = create_backend(system_type, Arc::new(RealCommandExecutor::new()));
    info!("Using {} enforcement backend", backend.name());
    FirewallEnforcer::new(backend, clock)
}

/// [`Enforcer`] over a [`RuleBackend`], with an in-memory rule index.
///
/// Rule commands for one IP run one at a time under a per-IP lock. The index
/// itself is only locked for lookups and updates, never across a command, so
/// a slow `iptables` call never holds up lookups for other addresses.
pub struct FirewallEnforcer {
    backend: Arc<dyn RuleBackend>,
    clock: Arc<dyn Clock>,
    index: Mutex<HashMap<IpAddr, Expiry>>,
    commands: KeyedLocks<IpAddr>,
}

impl FirewallEnforcer {
    pub fn new(backend: Box<dyn RuleBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend: Arc::from(backend),
            clock,
            index: Mutex::new(HashMap::new()),
            commands: KeyedLocks::default(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Number of entries in the index, expired ones included.
    pub async fn len(&self) -> usize {
        self.index().len()
    }

    pub async fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    fn index(&self) -> MutexGuard<'_, HashMap<IpAddr, Expiry>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup(&self, ip: &IpAddr) -> Option<Expiry> {
        self.index().get(ip).copied()
    }

    /// Run a rule command on the blocking pool; backends spawn processes.
    async fn run_backend<F>(&self, ip: IpAddr, command: F) -> GuardResult<()>
    where
        F: FnOnce(&dyn RuleBackend, IpAddr) -> GuardResult<()> + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || command(&*backend, ip))
            .await
            .map_err(|e| GuardError::enforcement(ip.to_string(), format!("Rule command task failed: {}", e)))?
    }
}

#[async_trait]
impl Enforcer for FirewallEnforcer {
    async fn block(&self, address: &str, kind: BlockKind, duration: Duration) -> GuardResult<BlockOutcome> {
        let ip = parse_address(address)?;
        let now = self.clock.now();
        let wanted = match kind {
            BlockKind::Ban => Expiry::Permanent,
            BlockKind::Timeout => Expiry::Until(clock::add_duration(now, duration)),
        };

        let _command = self.commands.lock(&ip).await;
        let outcome = match (self.lookup(&ip), wanted) {
            (Some(Expiry::Permanent), _) => BlockOutcome::Unchanged,
            (Some(Expiry::Until(_)), Expiry::Permanent) => BlockOutcome::Extended,
            (Some(Expiry::Until(current)), Expiry::Until(new)) if new > current => BlockOutcome::Extended,
            (Some(Expiry::Until(_)), Expiry::Until(_)) => BlockOutcome::Unchanged,
            (None, _) => {
                self.run_backend(ip, |backend, ip| backend.install(ip)).await?;
                BlockOutcome::Installed
            }
        };

        if outcome != BlockOutcome::Unchanged {
            self.index().insert(ip, wanted);
        }
        debug!("block {} ({:?}): {:?}", ip, kind, outcome);
        Ok(outcome)
    }

    async fn unblock(&self, address: &str) -> GuardResult<()> {
        let ip = parse_address(address)?;
        let _command = self.commands.lock(&ip).await;
        if self.lookup(&ip).is_none() {
            return Ok(());
        }
        self.run_backend(ip, |backend, ip| backend.remove(ip)).await?;
        self.index().remove(&ip);
        debug!("Removed drop rules for {}", ip);
        Ok(())
    }

    async fn is_blocked(&self, address: &str) -> bool {
        let Ok(ip) = parse_address(address) else {
            return false;
        };
        let now = self.clock.now();
        self.lookup(&ip).is_some_and(|expiry| !expiry.is_expired(now))
    }

    async fn expiry(&self, address: &str) -> Option<Expiry> {
        let ip = parse_address(address).ok()?;
        self.lookup(&ip)
    }

    async fn cleanup_expired(&self) -> GuardResult<usize> {
        let expired: Vec<IpAddr> = {
            let now = self.clock.now();
            self.index()
                .iter()
                .filter(|(_, expiry)| expiry.is_expired(now))
                .map(|(ip, _)| *ip)
                .collect()
        };

        let mut removed = 0;
        let mut first_error = None;
        for ip in expired {
            let _command = self.commands.lock(&ip).await;

            // A block may have extended the entry since the listing
            let still_expired = self
                .lookup(&ip)
                .is_some_and(|expiry| expiry.is_expired(self.clock.now()));
            if !still_expired {
                continue;
            }

            match self.run_backend(ip, |backend, ip| backend.remove(ip)).await {
                Ok(()) => {
                    self.index().remove(&ip);
                    removed += 1;
                }
                Err(e) => {
                    warn!("Failed to remove expired rule for {}: {}", ip, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if removed > 0 {
            info!("Removed {} expired drop rules", removed);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }
}

/// Run a command and turn a spawn failure or non-zero exit into
/// [`GuardError::Enforcement`].
pub(crate) fn run_checked(
    executor: &dyn CommandExecutor,
    ip: IpAddr,
    cmd: &str,
    args: &[String],
) -> GuardResult<CommandOutput> {
    let output = executor
        .execute(cmd, args)
        .map_err(|e| GuardError::enforcement(ip.to_string(), format!("Failed to execute {}: {}", cmd, e)))?;

    if output.success {
        Ok(output)
    } else {
        Err(GuardError::enforcement(
            ip.to_string(),
            format!("{} {} failed: {}", cmd, args.join(" "), output.error_text()),
        ))
    }
}

/// Check if running as root (effective UID == 0)
///
/// iptables and pfctl refuse rule changes from unprivileged users, so the
/// CLI checks this up front rather than failing on the first block.
pub fn check_root() -> anyhow::Result<()> {
    // SAFETY: geteuid() is a simple syscall that reads the effective user ID.
    // It has no preconditions, never fails, and doesn't modify any state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        anyhow::bail!(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has the CAP_NET_ADMIN capability."
        )
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::cmd_abstraction::CommandOutput;

    pub fn ok() -> CommandOutput {
        CommandOutput {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(stderr: &str) -> CommandOutput {
        CommandOutput {
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
            ..Default::default()
        }
    }
}
