//! iptables backend implementation.

use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{run_checked, RuleBackend};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor};
use crate::error::{GuardError, GuardResult};

/// Chain and address match flag for each direction.
const INBOUND: (&str, &str) = ("INPUT", "-s");
const OUTBOUND: (&str, &str) = ("OUTPUT", "-d");

/// iptables backend: one DROP rule per direction, inserted at the top of
/// the INPUT and OUTPUT chains.
pub struct IptablesBackend {
    executor: Arc<dyn CommandExecutor>,
}

impl IptablesBackend {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn binary(ip: IpAddr) -> &'static str {
        match ip {
            IpAddr::V4(_) => "iptables",
            IpAddr::V6(_) => "ip6tables",
        }
    }

    fn rule_args(op: &str, (chain, flag): (&str, &str), ip: IpAddr) -> Vec<String> {
        let ip = ip.to_string();
        if op == "-I" {
            args_to_strings(&[op, chain, "1", flag, &ip, "-j", "DROP"])
        } else {
            args_to_strings(&[op, chain, flag, &ip, "-j", "DROP"])
        }
    }

    /// `iptables -C` exits 0 if the rule exists, 1 if it does not.
    fn rule_exists(&self, ip: IpAddr, direction: (&str, &str)) -> GuardResult<bool> {
        let cmd = Self::binary(ip);
        let output = self
            .executor
            .execute(cmd, &Self::rule_args("-C", direction, ip))
            .map_err(|e| GuardError::enforcement(ip.to_string(), format!("Failed to execute {}: {}", cmd, e)))?;
        Ok(output.success)
    }

    /// Insert the rule unless it is already there. Returns whether it was inserted.
    fn ensure_rule(&self, ip: IpAddr, direction: (&str, &str)) -> GuardResult<bool> {
        if self.rule_exists(ip, direction)? {
            debug!("{} rule for {} already present", direction.0, ip);
            return Ok(false);
        }
        run_checked(
            self.executor.as_ref(),
            ip,
            Self::binary(ip),
            &Self::rule_args("-I", direction, ip),
        )?;
        Ok(true)
    }

    fn delete_rule(&self, ip: IpAddr, direction: (&str, &str)) -> GuardResult<()> {
        run_checked(
            self.executor.as_ref(),
            ip,
            Self::binary(ip),
            &Self::rule_args("-D", direction, ip),
        )
        .map(|_| ())
    }
}

impl RuleBackend for IptablesBackend {
    fn name(&self) -> &'static str {
        "iptables"
    }

    fn install(&self, ip: IpAddr) -> GuardResult<()> {
        let inserted_inbound = self.ensure_rule(ip, INBOUND)?;

        if let Err(e) = self.ensure_rule(ip, OUTBOUND) {
            if inserted_inbound {
                if let Err(rollback) = self.delete_rule(ip, INBOUND) {
                    warn!("Failed to roll back INPUT rule for {}: {}", ip, rollback);
                }
            }
            return Err(e);
        }

        info!("Installed iptables DROP rules for {}", ip);
        Ok(())
    }

    fn remove(&self, ip: IpAddr) -> GuardResult<()> {
        let mut first_error = None;

        for direction in [INBOUND, OUTBOUND] {
            let result = match self.rule_exists(ip, direction) {
                Ok(true) => self.delete_rule(ip, direction),
                Ok(false) => {
                    debug!("{} rule for {} already gone", direction.0, ip);
                    Ok(())
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to remove {} rule for {}: {}", direction.0, ip, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Removed iptables DROP rules for {}", ip);
                Ok(())
            }
        }
    }
}
