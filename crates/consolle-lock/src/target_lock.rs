//! Single advisory lock per supervised target, backed by `flock(2)` directly.
//!
//! Uses raw `libc::flock` instead of an RAII lock wrapper around a library
//! type to avoid the self-referential struct problem: a guard that borrows
//! its owner can't live in the same struct as the owner without lifetime
//! gymnastics. By owning the `File` outright (which owns the fd), `Drop`
//! can call `flock(fd, LOCK_UN)` directly to release.

use crate::error::LockError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    target: String,
    acquired_at: DateTime<Utc>,
}

/// Holds an exclusive advisory lock on a target's `tmp/cone/daemon.lock`
/// file, preventing two daemons from supervising the same project
/// concurrently. Released on `Drop`.
pub struct TargetLock {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for TargetLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `self.file` for the
        // lifetime of this call.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

impl TargetLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Acquire a non-blocking exclusive lock for `target` rooted at
/// `project_root`. Lock path: `{project_root}/tmp/cone/daemon.lock`.
///
/// On success, writes a diagnostic JSON blob (pid, target, acquired_at)
/// into the lock file and returns a guard that releases on drop. On
/// failure because another process holds the lock, attempts to read that
/// diagnostic to report the owning pid.
pub fn acquire_target_lock(project_root: &Path, target: &str) -> Result<TargetLock, LockError> {
    let lock_dir = project_root.join("tmp").join("cone");
    fs::create_dir_all(&lock_dir).map_err(|source| LockError::CreateDir {
        path: lock_dir.clone(),
        source,
    })?;

    let lock_path = lock_dir.join("daemon.lock");

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| LockError::Open {
            path: lock_path.clone(),
            source,
        })?;

    let fd = file.as_raw_fd();

    // SAFETY: `fd` is a valid descriptor from the `File` just opened above.
    let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };

    if ret != 0 {
        let mut contents = String::new();
        let held_by_pid = file
            .read_to_string(&mut contents)
            .map_err(LockError::DiagnosticUnreadable)
            .ok()
            .and_then(|_| serde_json::from_str::<LockDiagnostic>(&contents).ok())
            .map(|d| d.pid)
            .unwrap_or(0);
        return Err(LockError::AlreadyLocked { held_by_pid });
    }

    let diagnostic = LockDiagnostic {
        pid: std::process::id(),
        target: target.to_string(),
        acquired_at: Utc::now(),
    };
    let json = serde_json::to_string(&diagnostic).map_err(LockError::Serialize)?;

    file.set_len(0).map_err(LockError::DiagnosticWrite)?;
    file.write_all(json.as_bytes())
        .map_err(LockError::DiagnosticWrite)?;
    file.flush().map_err(LockError::DiagnosticWrite)?;

    Ok(TargetLock { file, lock_path })
}
