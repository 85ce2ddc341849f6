//! The on-disk store. One process-wide handle; writes are serialized behind
//! the connection mutex, which matches the single-writer model.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::migrations::run_migrations;
use ctx_core::{Error, Result};

/// Map a rusqlite error into the storage error kind.
pub(crate) fn storage_err(e: rusqlite::Error) -> Error {
  Error::Storage(e.to_string())
}

pub struct Store {
  pub(crate) conn: Mutex<Connection>,
  path: Option<PathBuf>,
}

impl Store {
  /// Open (or create) the store at `path` and run pending migrations.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(storage_err)?;
    Self::from_connection(conn, Some(path.to_path_buf()))
  }

  /// In-memory store for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().map_err(storage_err)?;
    Self::from_connection(conn, None)
  }

  fn from_connection(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
    conn
      .pragma_update(None, "journal_mode", "WAL")
      .map_err(|e| Error::Storage(format!("failed to enable WAL: {e}")))?;
    conn
      .pragma_update(None, "foreign_keys", "ON")
      .map_err(storage_err)?;
    run_migrations(&mut conn)?;
    Ok(Self {
      conn: Mutex::new(conn),
      path,
    })
  }

  pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|_| Error::Storage("store connection poisoned".to_string()))
  }

  /// Total bytes on disk, including WAL sidecar files.
  pub fn size_on_disk(&self) -> u64 {
    let Some(path) = &self.path else { return 0 };
    let mut total = 0;
    for suffix in ["", "-wal", "-shm"] {
      let mut candidate = path.as_os_str().to_owned();
      candidate.push(suffix);
      if let Ok(meta) = std::fs::metadata(PathBuf::from(&candidate)) {
        total += meta.len();
      }
    }
    total
  }

  pub fn stats(&self) -> Result<StoreStats> {
    let conn = self.conn()?;
    let project_count: u32 = conn
      .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
      .map_err(storage_err)?;
    let chunk_count: u64 = conn
      .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
      .map_err(storage_err)?;
    let eval_run_count: u32 = conn
      .query_row("SELECT COUNT(*) FROM eval_runs", [], |row| row.get(0))
      .map_err(storage_err)?;
    drop(conn);
    Ok(StoreStats {
      project_count,
      chunk_count,
      eval_run_count,
      size_on_disk: self.size_on_disk(),
    })
  }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StoreStats {
  pub project_count: u32,
  pub chunk_count: u64,
  pub eval_run_count: u32,
  pub size_on_disk: u64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_open_creates_parent_dirs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("context.db");
    let store = Store::open(&path).unwrap();
    assert!(path.exists());
    assert!(store.size_on_disk() > 0);
  }

  #[test]
  fn test_open_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("context.db");
    drop(Store::open(&path).unwrap());
    Store::open(&path).unwrap();
  }

  #[test]
  fn test_empty_stats() {
    let store = Store::open_in_memory().unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.project_count, 0);
    assert_eq!(stats.chunk_count, 0);
  }
}
