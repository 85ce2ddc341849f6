//! Forward-only schema migrations with version tracking.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::store::storage_err;
use ctx_core::Result;

/// A migration definition
#[derive(Debug, Clone)]
pub struct Migration {
  pub version: i64,
  pub name: &'static str,
  pub sql: &'static str,
}

/// All migrations in order
pub const MIGRATIONS: &[Migration] = &[Migration {
  version: 1,
  name: "initial_schema",
  sql: r#"
CREATE TABLE projects (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL UNIQUE,
  path TEXT NOT NULL,
  description TEXT,
  tags TEXT NOT NULL DEFAULT '[]',
  ignore_patterns TEXT NOT NULL DEFAULT '[]',
  embedding_model TEXT NOT NULL,
  embedding_dimensions INTEGER NOT NULL CHECK (embedding_dimensions >= 1),
  file_count INTEGER NOT NULL DEFAULT 0,
  chunk_count INTEGER NOT NULL DEFAULT 0,
  indexed_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE chunks (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  file_path TEXT NOT NULL,
  content TEXT NOT NULL,
  embedding BLOB NOT NULL,
  file_type TEXT NOT NULL,
  language TEXT,
  start_line INTEGER NOT NULL,
  end_line INTEGER NOT NULL CHECK (end_line >= start_line),
  metadata TEXT NOT NULL DEFAULT '{}',
  content_hash TEXT NOT NULL,
  indexed_at TEXT NOT NULL
);
CREATE INDEX idx_chunks_project ON chunks(project_id);
CREATE INDEX idx_chunks_project_file ON chunks(project_id, file_path);

CREATE TABLE file_hashes (
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  file_path TEXT NOT NULL,
  content_hash TEXT NOT NULL,
  indexed_at TEXT NOT NULL,
  PRIMARY KEY (project_id, file_path)
);

CREATE TABLE eval_runs (
  id TEXT PRIMARY KEY,
  project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
  timestamp TEXT NOT NULL,
  dataset_version TEXT NOT NULL,
  query_count INTEGER NOT NULL DEFAULT 0,
  aggregate_metrics TEXT NOT NULL DEFAULT '{}',
  config TEXT NOT NULL DEFAULT '{}',
  notes TEXT NOT NULL DEFAULT ''
);
CREATE INDEX idx_eval_runs_project ON eval_runs(project_id);

CREATE TABLE eval_results (
  id TEXT PRIMARY KEY,
  eval_run_id TEXT NOT NULL REFERENCES eval_runs(id) ON DELETE CASCADE,
  query TEXT NOT NULL,
  expected_files TEXT NOT NULL DEFAULT '[]',
  retrieved_files TEXT NOT NULL DEFAULT '[]',
  latency_ms INTEGER NOT NULL DEFAULT 0,
  metrics TEXT NOT NULL DEFAULT '{}',
  passed INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_eval_results_run ON eval_results(eval_run_id);
"#,
}];

/// Run all pending migrations. Each migration applies inside its own
/// transaction and is recorded in schema_migrations.
pub fn run_migrations(conn: &mut Connection) -> Result<u32> {
  conn
    .execute_batch(
      "CREATE TABLE IF NOT EXISTS schema_migrations (
        version INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        applied_at TEXT NOT NULL
      );",
    )
    .map_err(storage_err)?;

  let current: i64 = conn
    .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
      row.get(0)
    })
    .map_err(storage_err)?;

  let pending: Vec<_> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
  if pending.is_empty() {
    debug!("No pending migrations (schema version {current})");
    return Ok(0);
  }

  let mut applied = 0u32;
  for migration in pending {
    info!("Applying migration {}: {}", migration.version, migration.name);
    let tx = conn.transaction().map_err(storage_err)?;
    tx.execute_batch(migration.sql).map_err(storage_err)?;
    tx.execute(
      "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
      rusqlite::params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
    )
    .map_err(storage_err)?;
    tx.commit().map_err(storage_err)?;
    applied += 1;
  }

  Ok(applied)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_apply_once() {
    let mut conn = Connection::open_in_memory().unwrap();
    assert_eq!(run_migrations(&mut conn).unwrap(), MIGRATIONS.len() as u32);
    assert_eq!(run_migrations(&mut conn).unwrap(), 0);
  }

  #[test]
  fn test_migrations_are_ordered_and_unique() {
    for window in MIGRATIONS.windows(2) {
      assert!(window[1].version > window[0].version);
    }
    for m in MIGRATIONS {
      assert!(!m.name.is_empty());
    }
  }

  #[test]
  fn test_schema_has_core_tables() {
    let mut conn = Connection::open_in_memory().unwrap();
    run_migrations(&mut conn).unwrap();

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
         AND name IN ('projects', 'chunks', 'file_hashes', 'eval_runs', 'eval_results')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(count, 5);
  }
}
