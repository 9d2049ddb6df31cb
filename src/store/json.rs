//! JSON file implementation of the block store.
//!
//! The whole table lives in memory behind one mutex and is rewritten to disk
//! (atomically) after every mutation, while the mutex is still held, so the
//! file order of writes always matches the in-memory order.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::{BlockRecord, BlockStore};
use crate::clock::Clock;
use crate::error::{GuardError, GuardResult};
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::lock::StoreLock;

/// Write-through block store backed by a JSON array on disk.
pub struct JsonBlockStore {
    path: PathBuf,
    fs: Box<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, BlockRecord>>,
    _lock: Option<StoreLock>,
}

impl std::fmt::Debug for JsonBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonBlockStore")
            .field("path", &self.path)
            .field("records", &self.lock_records().len())
            .finish()
    }
}

impl JsonBlockStore {
    /// Open (or create) the store at `path` on the real filesystem and take
    /// the store's process lock.
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        let path = path.as_ref();
        let lock = StoreLock::acquire(path).map_err(|e| GuardError::Persistence(format!("{:#}", e)))?;
        let mut store = Self::open_with_fs(path, Box::new(RealFileSystem), clock)?;
        store._lock = Some(lock);
        Ok(store)
    }

    /// Open the store through an arbitrary [`FileSystem`], without locking.
    pub fn open_with_fs(
        path: impl AsRef<Path>,
        fs: Box<dyn FileSystem>,
        clock: Arc<dyn Clock>,
    ) -> GuardResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = load_records(fs.as_ref(), &path)?;
        info!("Loaded {} block records from {}", records.len(), path.display());

        Ok(Self {
            path,
            fs,
            clock,
            records: Mutex::new(records),
            _lock: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, BlockRecord>> {
        // A panic while holding the lock cannot leave a half-applied record:
        // every mutation is a single insert/remove.
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serialize the table and replace the file. Called with the table lock held.
    fn flush(&self, records: &HashMap<String, BlockRecord>) -> GuardResult<()> {
        let mut list: Vec<&BlockRecord> = records.values().collect();
        list.sort_by(|a, b| a.address.cmp(&b.address));

        let data = serde_json::to_vec_pretty(&list)
            .map_err(|e| GuardError::Persistence(format!("Failed to serialize block records: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !self.fs.exists(parent) {
                self.fs.create_dir_all(parent).map_err(|e| {
                    GuardError::Persistence(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        self.fs.write_atomic(&self.path, &data).map_err(|e| {
            warn!("Failed to write block records to {}: {}", self.path.display(), e);
            GuardError::Persistence(format!("Failed to write {}: {}", self.path.display(), e))
        })?;

        debug!("Wrote {} block records to {}", list.len(), self.path.display());
        Ok(())
    }

    /// Apply `mutate` to the record for `address` and flush.
    fn update<F>(&self, address: &str, mutate: F) -> GuardResult<BlockRecord>
    where
        F: FnOnce(Option<BlockRecord>, DateTime<Utc>) -> BlockRecord,
    {
        let now = self.clock.now();
        let mut records = self.lock_records();
        let updated = mutate(records.get(address).cloned(), now);
        records.insert(address.to_string(), updated.clone());
        self.flush(&records)?;
        Ok(updated)
    }
}

fn load_records(fs: &dyn FileSystem, path: &Path) -> GuardResult<HashMap<String, BlockRecord>> {
    let content = match fs.read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Block store {} does not exist yet, starting empty", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => {
            return Err(GuardError::Persistence(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    let list: Vec<BlockRecord> = serde_json::from_str(&content).map_err(|e| {
        GuardError::Persistence(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    let mut records = HashMap::with_capacity(list.len());
    for record in list {
        if record.address.is_empty() {
            warn!("Skipping block record with an empty address");
            continue;
        }
        records.insert(record.address.clone(), record);
    }
    Ok(records)
}

impl BlockStore for JsonBlockStore {
    fn get(&self, address: &str) -> Option<BlockRecord> {
        self.lock_records().get(address).cloned()
    }

    fn is_blocked(&self, address: &str) -> bool {
        let now = self.clock.now();
        self.lock_records()
            .get(address)
            .is_some_and(|r| r.is_blocked_at(now))
    }

    fn increment_hit(&self, address: &str, path: &str) -> GuardResult<BlockRecord> {
        self.update(address, |existing, now| match existing {
            Some(mut record) => {
                record.request_count = record.request_count.saturating_add(1);
                record.last_path = path.to_string();
                record
            }
            None => BlockRecord::first_hit(address, path, now),
        })
    }

    fn set_block(
        &self,
        address: &str,
        until: Option<DateTime<Utc>>,
        is_permanent: bool,
        path: &str,
    ) -> GuardResult<BlockRecord> {
        self.update(address, |existing, now| {
            let mut record = existing.unwrap_or_else(|| BlockRecord::first_hit(address, path, now));
            record.is_permanent = is_permanent;
            record.blocked_until = if is_permanent { None } else { until };
            record.last_path = path.to_string();
            record
        })
    }

    fn increment_escalation(&self, address: &str) -> GuardResult<BlockRecord> {
        let mut records = self.lock_records();
        let record = records.get_mut(address).ok_or_else(|| {
            GuardError::Persistence(format!("No block record for {}", address))
        })?;
        record.timeout_count = record.timeout_count.saturating_add(1);
        let updated = record.clone();
        debug!("Escalation count for {} is now {}", address, updated.timeout_count);
        self.flush(&records)?;
        Ok(updated)
    }

    fn set_timed_block(&self, address: &str, until: DateTime<Utc>, path: &str) -> GuardResult<BlockRecord> {
        self.update(address, |existing, now| {
            let mut record = existing.unwrap_or_else(|| BlockRecord::first_hit(address, path, now));
            record.is_permanent = false;
            record.blocked_until = Some(until);
            record.last_path = path.to_string();
            record.timeout_count = record.timeout_count.saturating_add(1);
            record
        })
    }

    fn delete(&self, address: &str) -> GuardResult<Option<BlockRecord>> {
        let mut records = self.lock_records();
        let removed = records.remove(address);
        if removed.is_some() {
            self.flush(&records)?;
        }
        Ok(removed)
    }

    fn list_all(&self) -> Vec<BlockRecord> {
        let mut list: Vec<BlockRecord> = self.lock_records().values().cloned().collect();
        list.sort_by(|a, b| a.address.cmp(&b.address));
        list
    }

    fn sweep_expired(&self) -> GuardResult<Vec<BlockRecord>> {
        let now = self.clock.now();
        let mut records = self.lock_records();

        let expired: Vec<String> = records
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.address.clone())
            .collect();

        if expired.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed: Vec<BlockRecord> = expired
            .iter()
            .filter_map(|address| records.remove(address))
            .collect();
        removed.sort_by(|a, b| a.address.cmp(&b.address));

        info!("Swept {} expired block records", removed.len());
        self.flush(&records)?;
        Ok(removed)
    }
}
