//! Session registry surface (spec.md supplemented section 4.8): the
//! minimal persistence a daemon needs so `status`/`restart` can report
//! consistent `{socket_path, pid}` data across daemon restarts, without
//! re-implementing a project-discovery catalog.

use crate::error::LockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Where a running daemon can be reached, and since when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub socket_path: PathBuf,
    pub pid: u32,
    pub updated_at: DateTime<Utc>,
}

/// Records which socket/pid currently serves a named target.
pub trait TargetRegistry: Send + Sync {
    fn record(&self, target: &str, socket_path: &Path, pid: u32) -> Result<(), LockError>;
    fn remove(&self, target: &str) -> Result<(), LockError>;
    fn get(&self, target: &str) -> Result<Option<TargetEntry>, LockError>;
}

type RegistryMap = HashMap<String, TargetEntry>;

/// A `TargetRegistry` backed by a single JSON file, guarded by an advisory
/// write lock per update (the registry file itself is not held locked
/// across processes beyond that single update, since exactly one daemon
/// ever owns a given target at a time).
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn with_locked_file<T>(
        &self,
        mutate: impl FnOnce(&mut RegistryMap) -> T,
    ) -> Result<T, LockError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| LockError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| LockError::Open {
                path: self.path.clone(),
                source,
            })?;

        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `file` for this call.
        // `LOCK_EX` blocks until any other writer finishes; registry writes
        // are quick, so this is not expected to stall daemon operations.
        unsafe {
            libc::flock(fd, libc::LOCK_EX);
        }

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(LockError::DiagnosticUnreadable)?;
        let mut map: RegistryMap = if contents.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(&contents).unwrap_or_default()
        };

        let result = mutate(&mut map);

        let json = serde_json::to_string_pretty(&map).map_err(LockError::Serialize)?;
        file.set_len(0).map_err(LockError::DiagnosticWrite)?;
        file.write_all(json.as_bytes())
            .map_err(LockError::DiagnosticWrite)?;
        file.flush().map_err(LockError::DiagnosticWrite)?;

        // SAFETY: `fd` is still valid and owned by `file`.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }

        Ok(result)
    }
}

impl TargetRegistry for JsonFileRegistry {
    fn record(&self, target: &str, socket_path: &Path, pid: u32) -> Result<(), LockError> {
        self.with_locked_file(|map| {
            map.insert(
                target.to_string(),
                TargetEntry {
                    socket_path: socket_path.to_path_buf(),
                    pid,
                    updated_at: Utc::now(),
                },
            );
        })
    }

    fn remove(&self, target: &str) -> Result<(), LockError> {
        self.with_locked_file(|map| {
            map.remove(target);
        })
    }

    fn get(&self, target: &str) -> Result<Option<TargetEntry>, LockError> {
        self.with_locked_file(|map| map.get(target).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_and_reads_back_entry() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("registry.json"));

        registry
            .record("my-app", Path::new("/tmp/my-app.sock"), 1234)
            .expect("record");

        let entry = registry.get("my-app").expect("get").expect("present");
        assert_eq!(entry.pid, 1234);
        assert_eq!(entry.socket_path, Path::new("/tmp/my-app.sock"));
    }

    #[test]
    fn remove_clears_entry() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("registry.json"));
        registry
            .record("my-app", Path::new("/tmp/my-app.sock"), 1234)
            .unwrap();
        registry.remove("my-app").unwrap();
        assert!(registry.get("my-app").unwrap().is_none());
    }

    #[test]
    fn unrelated_targets_survive_independent_updates() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("registry.json"));
        registry
            .record("app-a", Path::new("/tmp/a.sock"), 1)
            .unwrap();
        registry
            .record("app-b", Path::new("/tmp/b.sock"), 2)
            .unwrap();
        registry.remove("app-a").unwrap();

        assert!(registry.get("app-a").unwrap().is_none());
        assert!(registry.get("app-b").unwrap().is_some());
    }
}
