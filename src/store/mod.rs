//! Durable per-address block state.
//!
//! A [`BlockRecord`] exists for every address that has hit a suspicious path
//! at least once. The [`BlockStore`] trait is the only way to read or mutate
//! records; [`JsonBlockStore`] is the write-through implementation.

mod json;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use json::JsonBlockStore;

use crate::error::GuardResult;

/// Block state of a single address.
///
/// Field names on disk follow the durable schema (`blocked_at`,
/// `timeout_count`, `last_request_path`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub address: String,

    /// When the record was first created.
    #[serde(rename = "blocked_at")]
    pub created_at: DateTime<Utc>,

    /// End of the current timed block. `None` while the address is only
    /// tracked; never consulted for permanent records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,

    pub request_count: u64,

    /// How many timed blocks were applied so far. Only ever grows.
    #[serde(rename = "timeout_count", default)]
    pub timeout_count: u32,

    #[serde(default)]
    pub is_permanent: bool,

    #[serde(rename = "last_request_path", default)]
    pub last_path: String,
}

/// Where a record stands at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    /// Hits recorded, never blocked.
    Tracked,
    /// Timed block still running.
    Blocked,
    /// Permanent block.
    Banned,
    /// Timed block ran out; waiting for the sweep.
    Expired,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordState::Tracked => "tracked",
            RecordState::Blocked => "blocked",
            RecordState::Banned => "banned",
            RecordState::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl BlockRecord {
    /// A fresh record for the first suspicious hit.
    pub fn first_hit(address: &str, path: &str, now: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            created_at: now,
            blocked_until: None,
            request_count: 1,
            timeout_count: 0,
            is_permanent: false,
            last_path: path.to_string(),
        }
    }

    /// `!is_permanent && now > blocked_until`. The sweep, lazy reads and
    /// Restore all use this one predicate.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_permanent && self.blocked_until.is_some_and(|until| now > until)
    }

    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.is_permanent || self.blocked_until.is_some_and(|until| now <= until)
    }

    pub fn state(&self, now: DateTime<Utc>) -> RecordState {
        if self.is_permanent {
            RecordState::Banned
        } else {
            match self.blocked_until {
                None => RecordState::Tracked,
                Some(until) if now > until => RecordState::Expired,
                Some(_) => RecordState::Blocked,
            }
        }
    }
}

/// Durable table of [`BlockRecord`]s keyed by address.
///
/// Every mutation is atomic per address and durable before it returns. When
/// the flush to disk fails the mutation is kept in memory and
/// [`GuardError::Persistence`](crate::error::GuardError::Persistence) is
/// returned; `get` then reports the in-memory state.
#[cfg_attr(test, mockall::automock)]
pub trait BlockStore: Send + Sync {
    /// The stored record, whether or not its block is still running.
    fn get(&self, address: &str) -> Option<BlockRecord>;

    /// Lazy expiry read: false for a record whose timed block ran out even
    /// if the sweep has not removed it yet.
    fn is_blocked(&self, address: &str) -> bool;

    /// Count one suspicious hit, creating the record on the first one.
    fn increment_hit(&self, address: &str, path: &str) -> GuardResult<BlockRecord>;

    /// Record a block. `until` is ignored when `is_permanent` is set.
    fn set_block(
        &self,
        address: &str,
        until: Option<DateTime<Utc>>,
        is_permanent: bool,
        path: &str,
    ) -> GuardResult<BlockRecord>;

    fn increment_escalation(&self, address: &str) -> GuardResult<BlockRecord>;

    /// Record a timed block and count it towards escalation in one write:
    /// sets `blocked_until`, clears `is_permanent` and bumps `timeout_count`.
    fn set_timed_block(&self, address: &str, until: DateTime<Utc>, path: &str) -> GuardResult<BlockRecord>;

    fn delete(&self, address: &str) -> GuardResult<Option<BlockRecord>>;

    /// All records, ordered by address.
    fn list_all(&self) -> Vec<BlockRecord>;

    /// Remove and return every expired record.
    fn sweep_expired(&self) -> GuardResult<Vec<BlockRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_first_hit_record() {
        let record = BlockRecord::first_hit("203.0.113.5", "/.env", t0());
        assert_eq!(record.request_count, 1);
        assert_eq!(record.timeout_count, 0);
        assert_eq!(record.blocked_until, None);
        assert_eq!(record.state(t0()), RecordState::Tracked);
        assert!(!record.is_expired(t0()));
        assert!(!record.is_blocked_at(t0()));
    }

    #[test]
    fn test_timed_block_expiry_boundary() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/.env", t0());
        let until = t0() + Duration::hours(1);
        record.blocked_until = Some(until);

        assert!(record.is_blocked_at(until));
        assert!(!record.is_expired(until));

        let after = until + Duration::seconds(1);
        assert!(!record.is_blocked_at(after));
        assert!(record.is_expired(after));
        assert_eq!(record.state(after), RecordState::Expired);
    }

    #[test]
    fn test_permanent_ignores_blocked_until() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/wp-admin", t0());
        record.is_permanent = true;
        record.blocked_until = Some(t0() - Duration::days(30));

        assert!(record.is_blocked_at(t0()));
        assert!(!record.is_expired(t0()));
        assert_eq!(record.state(t0()), RecordState::Banned);
    }

    #[test]
    fn test_durable_field_names() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/.git/config", t0());
        record.blocked_until = Some(t0() + Duration::hours(1));
        record.timeout_count = 1;

        let value = serde_json::to_value(&record).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "address",
            "blocked_at",
            "blocked_until",
            "request_count",
            "timeout_count",
            "is_permanent",
            "last_request_path",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj.len(), 7);
    }

    #[test]
    fn test_blocked_until_absent_for_permanent() {
        let mut record = BlockRecord::first_hit("203.0.113.5", "/wp-admin", t0());
        record.is_permanent = true;
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("blocked_until"));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(RecordState::Banned.to_string(), "banned");
        assert_eq!(RecordState::Expired.to_string(), "expired");
    }
}
