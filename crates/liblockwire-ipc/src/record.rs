//! Owner records
//!
//! A lock owner publishes the id of its lock and the port of its communicator
//! in a small JSON file so a contending process knows where to send its
//! unlock request. The record is advisory: the lock itself stays the source of
//! truth, and a stale record only costs a request nobody answers.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use liblockwire_core::LockId;
use serde::{Deserialize, Serialize};

use crate::error::IpcError;

/// Where to reach the owner of a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    /// Process ID of the lock owner
    pub pid: u32,
    /// Lock the owner holds
    pub lock_id: LockId,
    /// Port of the owner's communicator
    pub port: u16,
    /// Host the owner runs on
    pub hostname: String,
    /// Human-readable name of the locked resource
    pub display_name: String,
    /// When the owner started holding the lock (Unix timestamp in ms)
    pub started_ts: u64,
}

impl OwnerRecord {
    /// Create a record for the current process
    pub fn new(lock_id: LockId, port: u16, hostname: String, display_name: String) -> Self {
        Self {
            pid: std::process::id(),
            lock_id,
            port,
            hostname,
            display_name,
            started_ts: current_time_ms(),
        }
    }

    /// Check if the record was written by this process
    pub fn is_owned_by_current_process(&self) -> bool {
        self.pid == std::process::id()
    }

    /// Read a record, `None` if there is none
    pub fn read(path: &Path) -> Result<Option<Self>, IpcError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        let record = serde_json::from_str(&contents).map_err(|e| {
            IpcError::RecordFile(format!(
                "failed to parse owner record '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(Some(record))
    }

    /// Write the record. Readers never see a half-written file.
    pub fn write(&self, path: &Path) -> Result<(), IpcError> {
        let contents = serde_json::to_string_pretty(self)?;
        let staging = staging_path(path);
        fs::write(&staging, contents)?;
        if let Err(e) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the record file
    pub fn remove(path: &Path) -> Result<(), IpcError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Remove the record only if this process wrote it
    pub fn release(path: &Path) -> Result<(), IpcError> {
        if let Some(record) = Self::read(path)? {
            if record.is_owned_by_current_process() {
                Self::remove(path)?;
            }
        }
        Ok(())
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Get current time in milliseconds since Unix epoch
fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> OwnerRecord {
        OwnerRecord::new(
            LockId::new(42),
            51234,
            "build-host".to_string(),
            "artifact cache".to_string(),
        )
    }

    #[test]
    fn test_record_creation() {
        let record = record();
        assert_eq!(record.pid, std::process::id());
        assert_eq!(record.lock_id, LockId::new(42));
        assert_eq!(record.port, 51234);
        assert!(record.started_ts > 0);
        assert!(record.is_owned_by_current_process());
    }

    #[test]
    fn test_record_read_write() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.lock.owner");

        assert!(OwnerRecord::read(&path).unwrap().is_none());

        let record = record();
        record.write(&path).unwrap();

        let read_back = OwnerRecord::read(&path).unwrap().unwrap();
        assert_eq!(read_back, record);
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn test_lock_id_stored_as_number() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("owner.json");
        record().write(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["lock_id"], 42);
        assert_eq!(json["port"], 51234);
    }

    #[test]
    fn test_corrupt_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("owner.json");
        fs::write(&path, "{ not json").unwrap();

        let err = OwnerRecord::read(&path).unwrap_err();
        assert!(matches!(err, IpcError::RecordFile(_)));
    }

    #[test]
    fn test_failed_write_leaves_no_staging_file() {
        let temp = TempDir::new().unwrap();
        // Renaming a file over a non-empty directory fails
        let path = temp.path().join("owner.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        assert!(record().write(&path).is_err());
        assert!(!staging_path(&path).exists());
        assert!(path.is_dir());
    }

    #[test]
    fn test_release_only_removes_own_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("owner.json");

        let mut foreign = record();
        foreign.pid = foreign.pid.wrapping_add(1);
        foreign.write(&path).unwrap();
        OwnerRecord::release(&path).unwrap();
        assert!(path.exists());

        record().write(&path).unwrap();
        OwnerRecord::release(&path).unwrap();
        assert!(!path.exists());

        // Removing twice is fine
        OwnerRecord::remove(&path).unwrap();
    }
}
