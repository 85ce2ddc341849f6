// Exclusive per-project write locks
//
// Ensures only one indexing run mutates a project at a time:
// - Lock files at <ctx dir>/locks/<hash>.lock
// - Stale lock detection via process alive check

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use ctx_core::{Error, Result};

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
  project_path: String,
  pid: u32,
  started_at: u64,
}

/// Held for the duration of scan+chunk+embed+store; released on drop.
pub struct ProjectLock {
  lock_path: PathBuf,
}

impl ProjectLock {
  /// Try to acquire the write lock for a project path. Fails if another live
  /// process holds it; stale locks from dead processes are cleaned up.
  pub fn acquire(locks_dir: &Path, project_path: &Path) -> Result<Self> {
    fs::create_dir_all(locks_dir)?;
    let lock_path = locks_dir.join(format!("{}.lock", path_hash(project_path)));

    if lock_path.exists() {
      match read_lock(&lock_path) {
        Ok(existing) if is_process_running(existing.pid) => {
          return Err(Error::Validation(format!(
            "project at {} is being indexed by process {}",
            existing.project_path, existing.pid
          )));
        }
        Ok(existing) => {
          info!("Cleaning up stale lock from dead process {}", existing.pid);
          fs::remove_file(&lock_path)?;
        }
        Err(e) => {
          warn!("Corrupted lock file, removing: {e}");
          fs::remove_file(&lock_path)?;
        }
      }
    }

    let record = LockRecord {
      project_path: project_path.to_string_lossy().into_owned(),
      pid: std::process::id(),
      started_at: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
    };
    let mut file = OpenOptions::new().write(true).create_new(true).open(&lock_path)?;
    file.write_all(serde_json::to_string_pretty(&record).unwrap_or_default().as_bytes())?;
    file.sync_all()?;

    Ok(Self { lock_path })
  }
}

impl Drop for ProjectLock {
  fn drop(&mut self) {
    if let Ok(record) = read_lock(&self.lock_path)
      && record.pid == std::process::id()
    {
      let _ = fs::remove_file(&self.lock_path);
    }
  }
}

fn read_lock(path: &Path) -> std::io::Result<LockRecord> {
  let mut file = File::open(path)?;
  let mut contents = String::new();
  file.read_to_string(&mut contents)?;
  serde_json::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Hash a project path to a short identifier
fn path_hash(path: &Path) -> String {
  let mut hasher = Sha256::new();
  hasher.update(path.to_string_lossy().as_bytes());
  hex::encode(&hasher.finalize()[..8])
}

/// Check if a process is running
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
  // kill(pid, 0) returns 0 if the process exists
  unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
  use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
  use windows_sys::Win32::System::Threading::{GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION};

  unsafe {
    let handle = OpenProcess(PROCESS_QUERY_INFORMATION, 0, pid);
    if handle.is_null() {
      return false;
    }
    let mut exit_code = 0;
    let result = GetExitCodeProcess(handle, &mut exit_code);
    CloseHandle(handle);
    result != 0 && exit_code == STILL_ACTIVE
  }
}

#[cfg(not(any(unix, windows)))]
fn is_process_running(_pid: u32) -> bool {
  true
}
