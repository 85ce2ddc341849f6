//! Chunk rows and file hashes.

use chrono::Utc;
use rusqlite::{Row, params};
use std::collections::HashMap;
use uuid::Uuid;

use crate::blob::{blob_to_vec, vec_to_blob};
use crate::store::{Store, storage_err};
use ctx_core::{Chunk, ChunkMetadata, Error, FileType, Language, Result};

/// Rows inserted per prepared-statement group inside a transaction.
const INSERT_GROUP_SIZE: usize = 100;

fn chunk_from_row(row: &Row<'_>, with_embedding: bool) -> rusqlite::Result<Chunk> {
  let id: String = row.get("id")?;
  let project_id: String = row.get("project_id")?;
  let file_type: String = row.get("file_type")?;
  let language: Option<String> = row.get("language")?;
  let metadata: String = row.get("metadata")?;
  let indexed_at: String = row.get("indexed_at")?;

  let embedding = if with_embedding {
    let blob: Vec<u8> = row.get("embedding")?;
    blob_to_vec(&blob).unwrap_or_default()
  } else {
    Vec::new()
  };

  Ok(Chunk {
    id: Uuid::parse_str(&id).unwrap_or_default(),
    project_id: Uuid::parse_str(&project_id).unwrap_or_default(),
    file_path: row.get("file_path")?,
    content: row.get("content")?,
    embedding,
    file_type: FileType::from_str_loose(&file_type).unwrap_or(FileType::Code),
    language: language.as_deref().and_then(Language::from_str_loose),
    start_line: row.get::<_, i64>("start_line")? as u32,
    end_line: row.get::<_, i64>("end_line")? as u32,
    metadata: ChunkMetadata::from_json(&metadata),
    content_hash: row.get("content_hash")?,
    indexed_at: chrono::DateTime::parse_from_rfc3339(&indexed_at)
      .map(|dt| dt.with_timezone(&Utc))
      .unwrap_or_else(|_| Utc::now()),
  })
}

const CHUNK_COLUMNS: &str =
  "id, project_id, file_path, content, embedding, file_type, language, start_line, end_line, metadata, content_hash, indexed_at";

/// Same row shape minus the blob; the lexical loader never pays for decode.
const CHUNK_COLUMNS_NO_EMBEDDING: &str =
  "id, project_id, file_path, content, file_type, language, start_line, end_line, metadata, content_hash, indexed_at";

fn insert_group(tx: &rusqlite::Transaction<'_>, chunks: &[Chunk]) -> Result<()> {
  let mut stmt = tx
    .prepare_cached(
      "INSERT OR REPLACE INTO chunks (id, project_id, file_path, content, embedding, file_type,
         language, start_line, end_line, metadata, content_hash, indexed_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .map_err(storage_err)?;

  for chunk in chunks {
    stmt
      .execute(params![
        chunk.id.to_string(),
        chunk.project_id.to_string(),
        chunk.file_path,
        chunk.content,
        vec_to_blob(&chunk.embedding),
        chunk.file_type.as_str(),
        chunk.language.map(|l| l.as_str()),
        chunk.start_line as i64,
        chunk.end_line as i64,
        chunk.metadata.to_json(),
        chunk.content_hash,
        chunk.indexed_at.to_rfc3339(),
      ])
      .map_err(storage_err)?;
  }
  Ok(())
}

impl Store {
  fn project_dimensions(&self, project_id: Uuid) -> Result<usize> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT embedding_dimensions FROM projects WHERE id = ?1",
        params![project_id.to_string()],
        |row| row.get::<_, i64>(0),
      )
      .map(|d| d as usize)
      .map_err(|_| Error::NotFound {
        entity: "project",
        id: project_id.to_string(),
      })
  }

  fn validate_chunks(&self, project_id: Uuid, chunks: &[Chunk]) -> Result<()> {
    let dims = self.project_dimensions(project_id)?;
    for chunk in chunks {
      if chunk.embedding.len() != dims {
        return Err(Error::DimensionMismatch {
          expected: dims,
          actual: chunk.embedding.len(),
        });
      }
      if chunk.start_line > chunk.end_line {
        return Err(Error::Validation(format!(
          "chunk {} has start_line {} > end_line {}",
          chunk.id, chunk.start_line, chunk.end_line
        )));
      }
    }
    Ok(())
  }

  /// Insert chunks in one transaction. Any rejected chunk rolls back all of them.
  pub fn insert_chunks(&self, project_id: Uuid, chunks: &[Chunk]) -> Result<()> {
    self.validate_chunks(project_id, chunks)?;
    let mut conn = self.conn()?;
    let tx = conn.transaction().map_err(storage_err)?;
    for group in chunks.chunks(INSERT_GROUP_SIZE) {
      insert_group(&tx, group)?;
    }
    tx.commit().map_err(storage_err)
  }

  /// Atomically replace all of a project's chunks (force re-index).
  pub fn replace_project_chunks(&self, project_id: Uuid, chunks: &[Chunk]) -> Result<()> {
    self.validate_chunks(project_id, chunks)?;
    let mut conn = self.conn()?;
    let tx = conn.transaction().map_err(storage_err)?;
    tx.execute("DELETE FROM chunks WHERE project_id = ?1", params![project_id.to_string()])
      .map_err(storage_err)?;
    for group in chunks.chunks(INSERT_GROUP_SIZE) {
      insert_group(&tx, group)?;
    }
    tx.commit().map_err(storage_err)
  }

  pub fn count_chunks(&self, project_id: Uuid) -> Result<u64> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT COUNT(*) FROM chunks WHERE project_id = ?1",
        params![project_id.to_string()],
        |row| row.get(0),
      )
      .map_err(storage_err)
  }

  /// Batched chunk reads for index builders. `with_embeddings = false` is the
  /// skip-embedding path used by the lexical loader.
  pub fn iter_chunks_batched(&self, project_id: Uuid, batch_size: usize, with_embeddings: bool) -> ChunkBatches<'_> {
    ChunkBatches {
      store: self,
      project_id,
      batch_size: batch_size.max(1),
      last_rowid: 0,
      with_embeddings,
      done: false,
    }
  }

  fn chunks_after(
    &self,
    project_id: Uuid,
    after_rowid: i64,
    limit: usize,
    with_embeddings: bool,
  ) -> Result<Vec<(i64, Chunk)>> {
    let conn = self.conn()?;
    let columns = if with_embeddings {
      format!("rowid, {CHUNK_COLUMNS}")
    } else {
      format!("rowid, {CHUNK_COLUMNS_NO_EMBEDDING}")
    };
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {columns} FROM chunks WHERE project_id = ?1 AND rowid > ?2 ORDER BY rowid LIMIT ?3"
      ))
      .map_err(storage_err)?;
    let rows = stmt
      .query_map(params![project_id.to_string(), after_rowid, limit as i64], |row| {
        let rowid: i64 = row.get(0)?;
        Ok((rowid, chunk_from_row(row, with_embeddings)?))
      })
      .map_err(storage_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
  }

  // --- file hashes ---

  pub fn upsert_file_hashes(&self, project_id: Uuid, hashes: &[(String, String)]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction().map_err(storage_err)?;
    {
      let mut stmt = tx
        .prepare_cached(
          "INSERT INTO file_hashes (project_id, file_path, content_hash, indexed_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(project_id, file_path) DO UPDATE SET
             content_hash = excluded.content_hash,
             indexed_at = excluded.indexed_at",
        )
        .map_err(storage_err)?;
      let now = Utc::now().to_rfc3339();
      for (path, hash) in hashes {
        stmt
          .execute(params![project_id.to_string(), path, hash, now])
          .map_err(storage_err)?;
      }
    }
    tx.commit().map_err(storage_err)
  }

  pub fn get_file_hashes(&self, project_id: Uuid) -> Result<HashMap<String, String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT file_path, content_hash FROM file_hashes WHERE project_id = ?1")
      .map_err(storage_err)?;
    let rows = stmt
      .query_map(params![project_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })
      .map_err(storage_err)?;
    rows.collect::<rusqlite::Result<HashMap<_, _>>>().map_err(storage_err)
  }
}

/// Keyset-paginated batches of a project's chunks. Each `next()` takes the
/// connection lock once, so long loads never starve writers.
pub struct ChunkBatches<'a> {
  store: &'a Store,
  project_id: Uuid,
  batch_size: usize,
  last_rowid: i64,
  with_embeddings: bool,
  done: bool,
}

impl Iterator for ChunkBatches<'_> {
  type Item = Result<Vec<Chunk>>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match self
      .store
      .chunks_after(self.project_id, self.last_rowid, self.batch_size, self.with_embeddings)
    {
      Ok(rows) => {
        if rows.is_empty() {
          self.done = true;
          return None;
        }
        if rows.len() < self.batch_size {
          self.done = true;
        }
        self.last_rowid = rows.last().map(|(rowid, _)| *rowid).unwrap_or(self.last_rowid);
        Some(Ok(rows.into_iter().map(|(_, chunk)| chunk).collect()))
      }
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ctx_core::{Project, chunk_id, content_hash};
  use std::path::PathBuf;

  fn setup() -> (Store, Project) {
    let store = Store::open_in_memory().unwrap();
    let project = Project::new("api", PathBuf::from("/tmp/api"), "nomic-embed-text", 4);
    store.upsert_project(&project).unwrap();
    (store, project)
  }

  fn sample_chunk(project: &Project, path: &str, start: u32, content: &str, embedding: Vec<f32>) -> Chunk {
    let hash = content_hash(content);
    Chunk {
      id: chunk_id(project.id, path, start, start + 2, &hash),
      project_id: project.id,
      file_path: path.to_string(),
      content: content.to_string(),
      embedding,
      file_type: FileType::Code,
      language: Some(Language::Rust),
      start_line: start,
      end_line: start + 2,
      metadata: ChunkMetadata::symbol("login", "function"),
      content_hash: hash,
      indexed_at: Utc::now(),
    }
  }

  #[test]
  fn test_insert_and_read_back() {
    let (store, project) = setup();
    let chunk = sample_chunk(&project, "src/auth.rs", 1, "fn login() {}", vec![0.5; 4]);
    store.insert_chunks(project.id, std::slice::from_ref(&chunk)).unwrap();

    let batches: Vec<_> = store
      .iter_chunks_batched(project.id, 10, true)
      .collect::<Result<Vec<_>>>()
      .unwrap();
    assert_eq!(batches.len(), 1);
    let loaded = &batches[0][0];
    assert_eq!(loaded.id, chunk.id);
    assert_eq!(loaded.embedding, vec![0.5; 4]);
    assert_eq!(loaded.metadata.symbol_name.as_deref(), Some("login"));
  }

  #[test]
  fn test_blob_round_trip_exact() {
    let (store, project) = setup();
    let embedding = vec![0.5f32, -0.25, 1.0e-8, 42.0];
    let chunk = sample_chunk(&project, "src/a.rs", 1, "fn a() {}", embedding.clone());
    store.insert_chunks(project.id, &[chunk]).unwrap();

    let loaded = store
      .iter_chunks_batched(project.id, 10, true)
      .next()
      .unwrap()
      .unwrap()
      .remove(0);
    for (a, b) in embedding.iter().zip(&loaded.embedding) {
      assert_eq!(a.to_bits(), b.to_bits());
    }
  }

  #[test]
  fn test_dimension_mismatch_rejected() {
    let (store, project) = setup();
    let bad = sample_chunk(&project, "src/a.rs", 1, "fn a() {}", vec![0.5; 3]);
    let err = store.insert_chunks(project.id, &[bad]).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
    assert_eq!(store.count_chunks(project.id).unwrap(), 0);
  }

  #[test]
  fn test_mixed_batch_rolls_back_entirely() {
    let (store, project) = setup();
    let good = sample_chunk(&project, "src/a.rs", 1, "fn a() {}", vec![0.5; 4]);
    let bad = sample_chunk(&project, "src/b.rs", 1, "fn b() {}", vec![0.5; 5]);
    assert!(store.insert_chunks(project.id, &[good, bad]).is_err());
    assert_eq!(store.count_chunks(project.id).unwrap(), 0);
  }

  #[test]
  fn test_replace_project_chunks() {
    let (store, project) = setup();
    let old = sample_chunk(&project, "src/old.rs", 1, "fn old() {}", vec![0.1; 4]);
    store.insert_chunks(project.id, &[old]).unwrap();

    let new = sample_chunk(&project, "src/new.rs", 1, "fn new() {}", vec![0.2; 4]);
    store.replace_project_chunks(project.id, &[new]).unwrap();

    let chunks: Vec<Chunk> = store
      .iter_chunks_batched(project.id, 10, true)
      .collect::<Result<Vec<_>>>()
      .unwrap()
      .into_iter()
      .flatten()
      .collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].file_path, "src/new.rs");
  }

  #[test]
  fn test_batched_iteration_pages() {
    let (store, project) = setup();
    let chunks: Vec<Chunk> = (0..25)
      .map(|i| {
        sample_chunk(
          &project,
          &format!("src/f{i}.rs"),
          1,
          &format!("fn f{i}() {{}}"),
          vec![i as f32; 4],
        )
      })
      .collect();
    store.insert_chunks(project.id, &chunks).unwrap();

    let batches: Vec<Vec<Chunk>> = store
      .iter_chunks_batched(project.id, 10, true)
      .collect::<Result<Vec<_>>>()
      .unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 25);
  }

  #[test]
  fn test_skip_embedding_read_path() {
    let (store, project) = setup();
    let chunk = sample_chunk(&project, "src/a.rs", 1, "fn a() {}", vec![0.5; 4]);
    store.insert_chunks(project.id, &[chunk]).unwrap();

    let loaded = store
      .iter_chunks_batched(project.id, 10, false)
      .next()
      .unwrap()
      .unwrap()
      .remove(0);
    assert!(loaded.embedding.is_empty());
    assert_eq!(loaded.content, "fn a() {}");
  }

  #[test]
  fn test_cascade_delete_with_project() {
    let (store, project) = setup();
    let chunk = sample_chunk(&project, "src/a.rs", 1, "fn a() {}", vec![0.5; 4]);
    store.insert_chunks(project.id, &[chunk]).unwrap();
    store
      .upsert_file_hashes(project.id, &[("src/a.rs".to_string(), "abc".to_string())])
      .unwrap();

    store.remove_project(project.id).unwrap();
    assert_eq!(store.count_chunks(project.id).unwrap(), 0);
    assert!(store.get_file_hashes(project.id).unwrap().is_empty());
  }

  #[test]
  fn test_file_hash_upsert() {
    let (store, project) = setup();
    store
      .upsert_file_hashes(project.id, &[("src/a.rs".to_string(), "v1".to_string())])
      .unwrap();
    store
      .upsert_file_hashes(project.id, &[("src/a.rs".to_string(), "v2".to_string())])
      .unwrap();

    let hashes = store.get_file_hashes(project.id).unwrap();
    assert_eq!(hashes.len(), 1);
    assert_eq!(hashes["src/a.rs"], "v2");
  }
}
