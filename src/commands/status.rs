//! Status command implementation.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::clock;
use crate::commands::{load_config, read_store};
use crate::store::{BlockRecord, BlockStore, RecordState};
use crate::utils::{format_count_with_separator, format_remaining, truncate};

#[derive(Debug, Serialize)]
struct StatusEntry<'a> {
    address: &'a str,
    state: RecordState,
    blocked_until: Option<DateTime<Utc>>,
    remaining_secs: Option<u64>,
    request_count: u64,
    timeout_count: u32,
    last_path: &'a str,
}

impl<'a> StatusEntry<'a> {
    fn new(record: &'a BlockRecord, now: DateTime<Utc>) -> Self {
        let state = record.state(now);
        let remaining_secs = match (state, record.blocked_until) {
            (RecordState::Blocked, Some(until)) => Some(clock::remaining(now, until).as_secs()),
            _ => None,
        };
        Self {
            address: &record.address,
            state,
            blocked_until: if record.is_permanent { None } else { record.blocked_until },
            remaining_secs,
            request_count: record.request_count,
            timeout_count: record.timeout_count,
            last_path: &record.last_path,
        }
    }
}

/// Run the status command
pub async fn run(json: bool, all: bool, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let store = read_store(&config)?;
    let now = Utc::now();

    let records = store.list_all();
    let entries: Vec<StatusEntry> = records
        .iter()
        .map(|r| StatusEntry::new(r, now))
        .filter(|e| all || matches!(e.state, RecordState::Blocked | RecordState::Banned))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let active = records.iter().filter(|r| r.is_blocked_at(now)).count();

    println!();
    println!("Store: {}", config.storage_file.display());
    println!("System: {}", config.system());
    println!(
        "Records: {} ({} active blocks)",
        format_count_with_separator(records.len() as u64),
        format_count_with_separator(active as u64)
    );
    println!();

    if entries.is_empty() {
        println!("No {} records.", if all { "stored" } else { "active" });
        println!();
        return Ok(());
    }

    println!(
        "{:<40} {:<8} {:>10} {:>9} {:>7}  LAST PATH",
        "ADDRESS", "STATE", "REMAINING", "REQUESTS", "BLOCKS"
    );
    for entry in &entries {
        let remaining = match (entry.state, entry.remaining_secs) {
            (RecordState::Banned, _) => "never".to_string(),
            (_, Some(secs)) => format_remaining(std::time::Duration::from_secs(secs)),
            _ => "-".to_string(),
        };
        println!(
            "{:<40} {:<8} {:>10} {:>9} {:>7}  {}",
            entry.address,
            entry.state.to_string(),
            remaining,
            format_count_with_separator(entry.request_count),
            entry.timeout_count,
            truncate(entry.last_path, 40)
        );
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_entry_for_timed_block() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/.env", t0());
        record.blocked_until = Some(t0() + Duration::minutes(90));
        record.timeout_count = 1;

        let entry = StatusEntry::new(&record, t0());
        assert_eq!(entry.state, RecordState::Blocked);
        assert_eq!(entry.remaining_secs, Some(5400));
        assert_eq!(entry.timeout_count, 1);
    }

    #[test]
    fn test_entry_for_ban_has_no_expiry() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/.env", t0());
        record.is_permanent = true;

        let entry = StatusEntry::new(&record, t0());
        assert_eq!(entry.state, RecordState::Banned);
        assert_eq!(entry.blocked_until, None);
        assert_eq!(entry.remaining_secs, None);
    }

    #[test]
    fn test_entry_json_shape() {
        let record = BlockRecord::first_hit("2001:db8::1", "/wp-login.php", t0());
        let json = serde_json::to_value(StatusEntry::new(&record, t0())).unwrap();
        assert_eq!(json["state"], "tracked");
        assert_eq!(json["request_count"], 1);
        assert!(json["remaining_secs"].is_null());
    }
}
