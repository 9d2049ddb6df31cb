//! Windows Firewall backend (`netsh advfirewall`).

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{run_checked, RuleBackend};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::{GuardError, GuardResult};

const DIRECTIONS: [&str; 2] = ["in", "out"];

/// One named block rule per direction, `pathwarden-in-<ip>` and
/// `pathwarden-out-<ip>`.
pub struct NetshBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl NetshBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    pub fn rule_name(dir: &str, ip: IpAddr) -> String {
        format!("pathwarden-{}-{}", dir, ip)
    }

    fn rule_exists(&self, dir: &str, ip: IpAddr) -> GuardResult<bool> {
        let name = format!("name={}", Self::rule_name(dir, ip));
        let args = args_to_strings(&["advfirewall", "firewall", "show", "rule", &name]);
        // "No rules match the specified criteria." comes back with exit code 1
        let output = self
            .executor
            .execute("netsh", &args)
            .map_err(|e| GuardError::enforcement(ip.to_string(), format!("Failed to execute netsh: {}", e)))?;
        Ok(output.success)
    }

    fn add_rule(&self, dir: &str, ip: IpAddr) -> GuardResult<bool> {
        if self.rule_exists(dir, ip)? {
            return Ok(false);
        }
        let name = format!("name={}", Self::rule_name(dir, ip));
        let dir_arg = format!("dir={}", dir);
        let addr_arg = format!("remoteip={}", ip);
        let args = args_to_strings(&[
            "advfirewall",
            "firewall",
            "add",
            "rule",
            &name,
            &dir_arg,
            "action=block",
            &addr_arg,
        ]);
        run_checked(self.executor.as_ref(), ip, "netsh", &args)?;
        Ok(true)
    }

    fn delete_rule(&self, dir: &str, ip: IpAddr) -> GuardResult<()> {
        let name = format!("name={}", Self::rule_name(dir, ip));
        let args = args_to_strings(&["advfirewall", "firewall", "delete", "rule", &name]);
        run_checked(self.executor.as_ref(), ip, "netsh", &args).map(|_| ())
    }
}

impl RuleBackend for NetshBackend {
    fn name(&self) -> &'static str {
        "netsh"
    }

    fn install(&self, ip: IpAddr) -> GuardResult<()> {
        let [inbound, outbound] = DIRECTIONS;
        let added_inbound = self.add_rule(inbound, ip)?;

        if let Err(e) = self.add_rule(outbound, ip) {
            if added_inbound {
                if let Err(rollback) = self.delete_rule(inbound, ip) {
                    warn!("Failed to roll back inbound firewall rule for {}: {}", ip, rollback);
                }
            }
            return Err(e);
        }

        info!("Added Windows Firewall block rules for {}", ip);
        Ok(())
    }

    fn remove(&self, ip: IpAddr) -> GuardResult<()> {
        let mut first_error = None;
        for dir in DIRECTIONS {
            let result = match self.rule_exists(dir, ip) {
                Ok(true) => self.delete_rule(dir, ip),
                Ok(false) => {
                    debug!("{} already gone", Self::rule_name(dir, ip));
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to delete {}: {}", Self::rule_name(dir, ip), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Deleted Windows Firewall block rules for {}", ip);
                Ok(())
            }
        }
    }
}
