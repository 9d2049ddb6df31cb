//! pf backend (macOS).
//!
//! Addresses go into the `<pathwarden>` table of the `pathwarden` anchor.
//! The anchor must be referenced from the main ruleset (`anchor "pathwarden"`
//! in /etc/pf.conf) for its rules to be evaluated.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::{run_checked, RuleBackend};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::{GuardError, GuardResult};

const ANCHOR: &str = "pathwarden";
const TABLE: &str = "pathwarden";

const ANCHOR_RULES: &str = "table <pathwarden> persist\n\
block drop quick from <pathwarden> to any\n\
block drop quick from any to <pathwarden>\n";

pub struct PfctlBackend {
    executor: Arc<dyn CommandExecutor>,
    anchor_loaded: AtomicBool,
}

impl PfctlBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            anchor_loaded: AtomicBool::new(false),
        }
    }

    /// Load the anchor rules and enable pf. Reloading the anchor resets its
    /// table, so this runs once per process.
    fn ensure_anchor(&self, ip: IpAddr) -> GuardResult<()> {
        if self.anchor_loaded.load(Ordering::Acquire) {
            return Ok(());
        }

        let args = args_to_strings(&["-a", ANCHOR, "-f", "-"]);
        let output = self
            .executor
            .execute_with_stdin("pfctl", &args, ANCHOR_RULES)
            .map_err(|e| GuardError::enforcement(ip.to_string(), format!("Failed to execute pfctl: {}", e)))?;
        if !output.success {
            return Err(GuardError::enforcement(
                ip.to_string(),
                format!("pfctl {} failed: {}", args.join(" "), output.error_text()),
            ));
        }

        // pfctl -E only bumps the enable reference count if pf is already on
        run_checked(self.executor.as_ref(), ip, "pfctl", &args_to_strings(&["-E"]))?;

        self.anchor_loaded.store(true, Ordering::Release);
        debug!("Loaded pf anchor {}", ANCHOR);
        Ok(())
    }

    fn table_args(op: &str, ip: IpAddr) -> Vec<String> {
        args_to_strings(&["-a", ANCHOR, "-t", TABLE, "-T", op, &ip.to_string()])
    }
}

impl RuleBackend for PfctlBackend {
    fn name(&self) -> &'static str {
        "pfctl"
    }

    fn install(&self, ip: IpAddr) -> GuardResult<()> {
        self.ensure_anchor(ip)?;
        run_checked(self.executor.as_ref(), ip, "pfctl", &Self::table_args("add", ip))?;
        info!("Added {} to pf table <{}>", ip, TABLE);
        Ok(())
    }

    fn remove(&self, ip: IpAddr) -> GuardResult<()> {
        run_checked(self.executor.as_ref(), ip, "pfctl", &Self::table_args("delete", ip))?;
        info!("Deleted {} from pf table <{}>", ip, TABLE);
        Ok(())
    }
}
