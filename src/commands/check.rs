//! Check command implementation.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::clock;
use crate::commands::{load_config, read_store};
use crate::matcher::PatternMatcher;
use crate::store::{BlockStore, RecordState};
use crate::utils::format_remaining;
use crate::validation::parse_address;

/// Run the check command
pub async fn run(ip_str: &str, config_path: &Path) -> Result<()> {
    let ip = parse_address(ip_str)?;
    let address = ip.to_string();

    let config = load_config(config_path)?;
    let matcher = PatternMatcher::new(&config.patterns, &config.whitelist);
    let store = read_store(&config)?;

    println!();
    if matcher.is_whitelisted(&address) {
        println!("IP {} is WHITELISTED", address);
    }

    let now = Utc::now();
    match store.get(&address) {
        None => println!("IP {} has no record", address),
        Some(record) => {
            match (record.state(now), record.blocked_until) {
                (RecordState::Banned, _) => println!("IP {} is BANNED", address),
                (RecordState::Blocked, Some(until)) => println!(
                    "IP {} is BLOCKED for {} (until {})",
                    address,
                    format_remaining(clock::remaining(now, until)),
                    until.format("%Y-%m-%d %H:%M:%S UTC")
                ),
                (state, _) => println!("IP {} is NOT blocked ({})", address, state),
            }
            println!("  Suspicious requests: {}", record.request_count);
            println!("  Timed blocks so far: {}", record.timeout_count);
            println!("  Last path: {}", record.last_path);
            println!("  First seen: {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
    }
    println!();

    Ok(())
}
