//! Project rows.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use std::path::PathBuf;
use uuid::Uuid;

use crate::store::{Store, storage_err};
use ctx_core::{Error, Project, Result};

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
  let id: String = row.get("id")?;
  let tags: String = row.get("tags")?;
  let ignore_patterns: String = row.get("ignore_patterns")?;
  let path: String = row.get("path")?;
  let indexed_at: String = row.get("indexed_at")?;
  let updated_at: String = row.get("updated_at")?;

  Ok(Project {
    id: Uuid::parse_str(&id).unwrap_or_default(),
    name: row.get("name")?,
    path: PathBuf::from(path),
    description: row.get("description")?,
    tags: serde_json::from_str(&tags).unwrap_or_default(),
    ignore_patterns: serde_json::from_str(&ignore_patterns).unwrap_or_default(),
    embedding_model: row.get("embedding_model")?,
    embedding_dimensions: row.get::<_, i64>("embedding_dimensions")? as usize,
    file_count: row.get::<_, i64>("file_count")? as u32,
    chunk_count: row.get::<_, i64>("chunk_count")? as u32,
    indexed_at: parse_ts(&indexed_at),
    updated_at: parse_ts(&updated_at),
  })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|_| Utc::now())
}

const PROJECT_COLUMNS: &str = "id, name, path, description, tags, ignore_patterns, embedding_model, \
  embedding_dimensions, file_count, chunk_count, indexed_at, updated_at";

impl Store {
  /// Create or update a project. The name must be unique or refer to the
  /// same project id.
  pub fn upsert_project(&self, project: &Project) -> Result<()> {
    let conn = self.conn()?;

    if let Some(existing_id) = conn
      .query_row(
        "SELECT id FROM projects WHERE name = ?1",
        params![project.name],
        |row| row.get::<_, String>(0),
      )
      .optional()
      .map_err(storage_err)?
      && existing_id != project.id.to_string()
    {
      return Err(Error::Validation(format!(
        "project name '{}' is already taken",
        project.name
      )));
    }

    conn
      .execute(
        "INSERT INTO projects (id, name, path, description, tags, ignore_patterns,
           embedding_model, embedding_dimensions, file_count, chunk_count, indexed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           path = excluded.path,
           description = excluded.description,
           tags = excluded.tags,
           ignore_patterns = excluded.ignore_patterns,
           embedding_model = excluded.embedding_model,
           embedding_dimensions = excluded.embedding_dimensions,
           updated_at = excluded.updated_at",
        params![
          project.id.to_string(),
          project.name,
          project.path.to_string_lossy(),
          project.description,
          serde_json::to_string(&project.tags).unwrap_or_else(|_| "[]".to_string()),
          serde_json::to_string(&project.ignore_patterns).unwrap_or_else(|_| "[]".to_string()),
          project.embedding_model,
          project.embedding_dimensions as i64,
          project.file_count as i64,
          project.chunk_count as i64,
          project.indexed_at.to_rfc3339(),
          project.updated_at.to_rfc3339(),
        ],
      )
      .map_err(storage_err)?;
    Ok(())
  }

  pub fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
    let conn = self.conn()?;
    conn
      .query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
        params![name],
        project_from_row,
      )
      .optional()
      .map_err(storage_err)
  }

  pub fn get_project_by_id(&self, id: Uuid) -> Result<Option<Project>> {
    let conn = self.conn()?;
    conn
      .query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
        params![id.to_string()],
        project_from_row,
      )
      .optional()
      .map_err(storage_err)
  }

  /// All projects, most recently updated first.
  pub fn list_projects(&self) -> Result<Vec<Project>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC"
      ))
      .map_err(storage_err)?;
    let rows = stmt.query_map([], project_from_row).map_err(storage_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
  }

  /// Refresh counters and timestamps after an indexing run.
  pub fn update_project_counts(&self, id: Uuid, file_count: u32, chunk_count: u32) -> Result<()> {
    let conn = self.conn()?;
    let now = Utc::now().to_rfc3339();
    let changed = conn
      .execute(
        "UPDATE projects SET file_count = ?2, chunk_count = ?3, indexed_at = ?4, updated_at = ?4
         WHERE id = ?1",
        params![id.to_string(), file_count as i64, chunk_count as i64, now],
      )
      .map_err(storage_err)?;
    if changed == 0 {
      return Err(Error::NotFound {
        entity: "project",
        id: id.to_string(),
      });
    }
    Ok(())
  }

  /// Delete a project; chunks, file hashes, and eval history cascade.
  pub fn remove_project(&self, id: Uuid) -> Result<()> {
    let conn = self.conn()?;
    let changed = conn
      .execute("DELETE FROM projects WHERE id = ?1", params![id.to_string()])
      .map_err(storage_err)?;
    if changed == 0 {
      return Err(Error::NotFound {
        entity: "project",
        id: id.to_string(),
      });
    }
    Ok(())
  }
}
