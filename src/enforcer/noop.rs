//! Backends that never touch the host firewall.

use std::net::IpAddr;
use tracing::debug;

use super::RuleBackend;
use crate::error::{GuardError, GuardResult};

/// Accepts every rule change without running anything. Used for dry runs
/// and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl RuleBackend for NoopBackend {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn install(&self, ip: IpAddr) -> GuardResult<()> {
        debug!("[noop] would install drop rules for {}", ip);
        Ok(())
    }

    fn remove(&self, ip: IpAddr) -> GuardResult<()> {
        debug!("[noop] would remove drop rules for {}", ip);
        Ok(())
    }
}

/// Stand-in for a system type nothing knows how to drive.
#[derive(Debug, Clone)]
pub struct UnsupportedBackend {
    system: String,
}

impl UnsupportedBackend {
    pub fn new(system: impl Into<String>) -> Self {
        Self { system: system.into() }
    }
}

impl RuleBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn install(&self, _ip: IpAddr) -> GuardResult<()> {
        Err(GuardError::UnsupportedSystem(self.system.clone()))
    }

    fn remove(&self, _ip: IpAddr) -> GuardResult<()> {
        Err(GuardError::UnsupportedSystem(self.system.clone()))
    }
}
