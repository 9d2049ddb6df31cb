//! Centralized validation for pathwarden.
//!
//! - client addresses (everything handed to a packet-filter command goes
//!   through [`parse_address`] first)
//! - whitelist entries (single addresses or CIDR ranges)
//! - duration strings in the `30s` / `15m` / `24h` / `7d` format

use anyhow::{bail, Result};
use ipnet::IpNet;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{GuardError, GuardResult};

/// Parse a client address.
///
/// # Examples
/// ```
/// use pathwarden::validation::parse_address;
/// assert!(parse_address("203.0.113.5").is_ok());
/// assert!(parse_address("2001:db8::1").is_ok());
/// assert!(parse_address("").is_err());
/// assert!(parse_address("1.2.3.4; reboot").is_err());
/// ```
pub fn parse_address(address: &str) -> GuardResult<IpAddr> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(GuardError::InvalidAddress(address.to_string()));
    }
    trimmed
        .parse()
        .map_err(|_| GuardError::InvalidAddress(address.to_string()))
}

/// Parse a whitelist entry. A plain address becomes a /32 or /128 network.
///
/// # Examples
/// ```
/// use pathwarden::validation::parse_network;
/// assert_eq!(parse_network("10.0.0.1").unwrap().to_string(), "10.0.0.1/32");
/// assert!(parse_network("10.0.0.0/8").is_ok());
/// assert!(parse_network("10.0.0.0/33").is_err());
/// ```
pub fn parse_network(entry: &str) -> Result<IpNet> {
    let entry = entry.trim();
    if entry.contains('/') {
        entry
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid CIDR: {}", entry))
    } else {
        let ip: IpAddr = entry
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid IP address: {}", entry))?;
        Ok(IpNet::from(ip))
    }
}

/// Interval format check (e.g., "4h", "30m", "1d").
///
/// Requires ASCII-only input to prevent Unicode-related edge cases.
pub fn is_valid_interval(interval: &str) -> bool {
    parse_interval(interval).is_ok()
}

/// Parse an interval string into a [`Duration`].
///
/// Valid suffixes: `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
///
/// # Examples
/// ```
/// use pathwarden::validation::parse_interval;
/// use std::time::Duration;
/// assert_eq!(parse_interval("90s").unwrap(), Duration::from_secs(90));
/// assert_eq!(parse_interval("24h").unwrap(), Duration::from_secs(86_400));
/// assert!(parse_interval("4x").is_err());
/// ```
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if interval.is_empty() {
        bail!("Interval cannot be empty");
    }

    if !interval.is_ascii() {
        bail!("Invalid interval '{}'. Only ASCII characters allowed", interval);
    }

    if interval.len() < 2 {
        bail!("Invalid interval '{}'. Use format like '4h', '30m', '1d'", interval);
    }

    // ASCII-only, so splitting one byte off the end lands on a char boundary.
    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    let unit_secs: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => bail!("Invalid interval '{}'. Suffix must be s, m, h, or d", interval),
    };

    let count: u32 = num_part.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid interval '{}'. Number part must be a positive integer",
            interval
        )
    })?;

    Ok(Duration::from_secs(u64::from(count) * unit_secs))
}

/// Render a duration in the largest whole unit of the interval format.
///
/// # Examples
/// ```
/// use pathwarden::validation::format_interval;
/// use std::time::Duration;
/// assert_eq!(format_interval(Duration::from_secs(7_200)), "2h");
/// assert_eq!(format_interval(Duration::from_secs(90)), "90s");
/// ```
pub fn format_interval(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    if secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
