//! Suspicious-path matching and the address whitelist.
//!
//! Both lists are fixed when the matcher is built; there is no way to change
//! them afterwards.

use ipnet::IpNet;
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::warn;

/// Paths that scanners probe for. Matching is case-insensitive and by
/// prefix, so `/.git` also covers `/.git/config`.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "/.env",
    "/wp-admin",
    "/admin",
    "/config",
    "/backup",
    "/.git",
    "/wp-login.php",
    "/phpmyadmin",
    "/administrator",
    "/jenkins",
    "/.htaccess",
    "/.htpasswd",
    "/server-status",
    "/server-info",
    "/web.config",
    "/elmah.axd",
    "/trace.axd",
    "/install",
    "/setup",
    "/console",
    "/wp-content/debug.log",
    "/api/swagger",
    "/api/docs",
    "/actuator",
    "/v1/metrics",
    "/v2/metrics",
    "/metrics",
    "/debug/vars",
    "/debug/pprof",
];

pub const DEFAULT_WHITELIST: &[&str] = &["127.0.0.1", "::1"];

pub fn default_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect()
}

pub fn default_whitelist() -> Vec<String> {
    DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect()
}

/// Path patterns plus whitelist, immutable after construction.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<String>,
    addresses: HashSet<IpAddr>,
    networks: Vec<IpNet>,
    // Whitelist entries that are neither an address nor a network
    literals: HashSet<String>,
}

impl PatternMatcher {
    pub fn new(patterns: &[String], whitelist: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        let mut addresses = HashSet::new();
        let mut networks = Vec::new();
        let mut literals = HashSet::new();
        for entry in whitelist {
            let entry = entry.trim();
            if let Ok(ip) = entry.parse::<IpAddr>() {
                addresses.insert(ip);
            } else if let Ok(net) = entry.parse::<IpNet>() {
                networks.push(net);
            } else if !entry.is_empty() {
                warn!("Whitelist entry '{}' is not an IP address or CIDR, matching it literally", entry);
                literals.insert(entry.to_string());
            }
        }

        Self {
            patterns,
            addresses,
            networks,
            literals,
        }
    }

    /// True if `path` equals or starts with one of the patterns, ignoring case.
    pub fn is_suspicious(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.patterns.iter().any(|pattern| path.starts_with(pattern.as_str()))
    }

    pub fn is_whitelisted(&self, address: &str) -> bool {
        let address = address.trim();
        if self.literals.contains(address) {
            return true;
        }
        match address.parse::<IpAddr>() {
            Ok(ip) => self.addresses.contains(&ip) || self.networks.iter().any(|net| net.contains(&ip)),
            Err(_) => false,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new(&default_patterns(), &default_whitelist())
    }
}
