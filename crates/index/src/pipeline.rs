//! Indexing pipeline: scanning -> chunking -> embedding -> storing.
//!
//! Non-fatal errors land in the report's warnings; only I/O, schema, and
//! dimension errors abort the run. Cancellation is polled at batch
//! boundaries and leaves no partial writes behind.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::chunker::{ChunkDraft, ChunkerConfig, chunk_file};
use crate::lock::ProjectLock;
use crate::scanner::{FileInfo, ScanOptions, scan};
use ctx_core::{Chunk, Error, Project, Result, chunk_id, content_hash};
use db::Store;
use embedding::Embedder;

#[derive(Debug, Clone)]
pub struct IndexOptions {
  pub path: PathBuf,
  /// Defaults to the directory name.
  pub name: Option<String>,
  pub tags: Vec<String>,
  pub description: Option<String>,
  pub force: bool,
  pub extra_ignore: Vec<String>,
}

impl IndexOptions {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      name: None,
      tags: Vec::new(),
      description: None,
      force: false,
      extra_ignore: Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Scanning,
  Chunking,
  Embedding,
  Storing,
}

impl Stage {
  pub fn as_str(&self) -> &'static str {
    match self {
      Stage::Scanning => "scanning",
      Stage::Chunking => "chunking",
      Stage::Embedding => "embedding",
      Stage::Storing => "storing",
    }
  }
}

#[derive(Debug)]
pub enum PipelineEvent {
  StageStarted { stage: Stage },
  Progress { stage: Stage, done: usize, total: usize },
  StageCompleted { stage: Stage },
  Warning { message: String },
}

#[derive(Debug)]
pub struct IndexReport {
  pub project: Project,
  pub files_scanned: usize,
  pub chunks_created: usize,
  pub chunks_embedded: usize,
  pub warnings: Vec<String>,
  pub duration_ms: u64,
}

pub struct IndexingPipeline {
  store: Arc<Store>,
  embedder: Arc<dyn Embedder>,
  chunker: ChunkerConfig,
  batch_size: usize,
  locks_dir: PathBuf,
}

impl IndexingPipeline {
  pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>, locks_dir: PathBuf) -> Self {
    Self {
      store,
      embedder,
      chunker: ChunkerConfig::default(),
      batch_size: 32,
      locks_dir,
    }
  }

  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
    self.chunker = config;
    self
  }

  /// Run the full pipeline for one project.
  pub async fn index_project(
    &self,
    opts: IndexOptions,
    on_event: &(dyn Fn(PipelineEvent) + Send + Sync),
    cancel: &CancellationToken,
  ) -> Result<IndexReport> {
    let started = std::time::Instant::now();

    let root = opts
      .path
      .canonicalize()
      .map_err(|e| Error::Validation(format!("cannot index {}: {e}", opts.path.display())))?;
    let name = opts
      .name
      .clone()
      .or_else(|| root.file_name().map(|n| n.to_string_lossy().into_owned()))
      .ok_or_else(|| Error::Validation("cannot derive a project name from the path".to_string()))?;

    // Cheap checks before any expensive work.
    let existing = self.store.get_project_by_name(&name)?;
    let mut project = match existing {
      Some(existing) if !opts.force => return Err(Error::AlreadyIndexed(existing.name)),
      Some(existing) => {
        if existing.embedding_dimensions != self.embedder.dimensions() {
          return Err(Error::DimensionMismatch {
            expected: existing.embedding_dimensions,
            actual: self.embedder.dimensions(),
          });
        }
        existing
      }
      None => Project::new(
        &name,
        root.clone(),
        self.embedder.model_id(),
        self.embedder.dimensions(),
      ),
    };
    project.path = root.clone();
    if !opts.tags.is_empty() {
      project.tags = opts.tags.clone();
    }
    if opts.description.is_some() {
      project.description = opts.description.clone();
    }
    project.ignore_patterns = opts.extra_ignore.clone();
    project.updated_at = Utc::now();

    // Replacing an existing index must not race another writer.
    let _lock = if opts.force {
      Some(ProjectLock::acquire(&self.locks_dir, &root)?)
    } else {
      None
    };

    let warnings: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let warn = |message: String| {
      on_event(PipelineEvent::Warning { message: message.clone() });
      if let Ok(mut sink) = warnings.lock() {
        sink.push(message);
      }
    };

    // --- scanning ---
    on_event(PipelineEvent::StageStarted { stage: Stage::Scanning });
    let scan_opts = ScanOptions {
      extra_ignore: opts.extra_ignore.clone(),
      ..Default::default()
    };
    let scan_result = scan(&root, &scan_opts, &|_| {}, &|message| warn(format!("scan: {message}")));
    info!(
      "Scanned {} files in {}ms",
      scan_result.stats.total_files, scan_result.stats.scan_duration_ms
    );
    on_event(PipelineEvent::StageCompleted { stage: Stage::Scanning });

    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    // --- chunking ---
    on_event(PipelineEvent::StageStarted { stage: Stage::Chunking });
    let total_files = scan_result.files.len();
    let mut drafts: Vec<ChunkDraft> = Vec::new();
    let mut file_hashes: Vec<(String, String)> = Vec::new();

    for (done, file) in scan_result.files.iter().enumerate() {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }
      match std::fs::read_to_string(&file.path) {
        Ok(content) => {
          file_hashes.push((file.relative_path.clone(), content_hash(&content)));
          let result = chunk_file(file, &content, &self.chunker);
          for warning in result.warnings {
            warn(format!("{}: {warning}", file.relative_path));
          }
          drafts.extend(result.chunks);
        }
        Err(e) => warn(format!("{}: {e}", file.relative_path)),
      }
      if done % 50 == 0 {
        on_event(PipelineEvent::Progress {
          stage: Stage::Chunking,
          done,
          total: total_files,
        });
      }
    }
    let chunks_created = drafts.len();
    debug!("Chunked {total_files} files into {chunks_created} chunks");
    on_event(PipelineEvent::StageCompleted { stage: Stage::Chunking });

    // --- embedding ---
    on_event(PipelineEvent::StageStarted { stage: Stage::Embedding });
    let mut embedded: Vec<(ChunkDraft, Vec<f32>)> = Vec::with_capacity(drafts.len());
    let total_chunks = drafts.len();
    let mut done = 0usize;

    for batch in drafts.chunks(self.batch_size) {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }
      let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
      match self.embedder.embed_batch(&texts).await {
        Ok(vectors) => {
          for (draft, vector) in batch.iter().zip(vectors) {
            if vector.len() != self.embedder.dimensions() {
              return Err(Error::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: vector.len(),
              });
            }
            embedded.push((draft.clone(), vector));
          }
        }
        Err(embedding::EmbedError::DimensionMismatch { expected, actual }) => {
          return Err(Error::DimensionMismatch { expected, actual });
        }
        Err(e) => {
          // Per-chunk failures are non-fatal; the successes already
          // collected stay in.
          for draft in batch {
            warn(format!("embedding failed for {}:{}: {e}", draft.file_path, draft.start_line));
          }
        }
      }
      done += batch.len();
      on_event(PipelineEvent::Progress {
        stage: Stage::Embedding,
        done,
        total: total_chunks,
      });
    }
    let chunks_embedded = embedded.len();
    on_event(PipelineEvent::StageCompleted { stage: Stage::Embedding });

    if cancel.is_cancelled() {
      return Err(Error::Cancelled);
    }

    // --- storing ---
    on_event(PipelineEvent::StageStarted { stage: Stage::Storing });
    self.store.upsert_project(&project)?;

    let now = Utc::now();
    let chunks: Vec<Chunk> = embedded
      .into_iter()
      .map(|(draft, embedding)| Chunk {
        id: chunk_id(
          project.id,
          &draft.file_path,
          draft.start_line,
          draft.end_line,
          &draft.content_hash,
        ),
        project_id: project.id,
        file_path: draft.file_path,
        content: draft.content,
        embedding,
        file_type: draft.file_type,
        language: draft.language,
        start_line: draft.start_line,
        end_line: draft.end_line,
        metadata: draft.metadata,
        content_hash: draft.content_hash,
        indexed_at: now,
      })
      .collect();

    if opts.force {
      self.store.replace_project_chunks(project.id, &chunks)?;
    } else {
      self.store.insert_chunks(project.id, &chunks)?;
    }
    self.store.upsert_file_hashes(project.id, &file_hashes)?;
    self
      .store
      .update_project_counts(project.id, total_files as u32, chunks.len() as u32)?;
    on_event(PipelineEvent::StageCompleted { stage: Stage::Storing });

    let project = self
      .store
      .get_project_by_id(project.id)?
      .ok_or_else(|| Error::Storage("project vanished during indexing".to_string()))?;

    Ok(IndexReport {
      project,
      files_scanned: total_files,
      chunks_created,
      chunks_embedded,
      warnings: warnings.into_inner().unwrap_or_default(),
      duration_ms: started.elapsed().as_millis() as u64,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;
  use embedding::EmbedError;
  use std::collections::BTreeSet;
  use tempfile::TempDir;

  /// Deterministic embedder: hashes content into a small vector.
  struct HashEmbedder {
    dims: usize,
  }

  #[async_trait]
  impl Embedder for HashEmbedder {
    fn provider_id(&self) -> &str {
      "test"
    }
    fn model_id(&self) -> &str {
      "hash-embed"
    }
    fn dimensions(&self) -> usize {
      self.dims
    }

    async fn embed_batch(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
      Ok(
        texts
          .iter()
          .map(|t| {
            (0..self.dims)
              .map(|i| ((t.len() + i) % 97) as f32 / 97.0)
              .collect()
          })
          .collect(),
      )
    }

    async fn is_available(&self) -> std::result::Result<(), EmbedError> {
      Ok(())
    }
  }

  fn sample_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(
      dir.path().join("auth.ts"),
      "export function login(user: string) {\n  return issueToken(user);\n}\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("README.md"), "# Demo\n\nA sample project used in tests.\n").unwrap();
    dir
  }

  fn pipeline(store: Arc<Store>, locks: &TempDir) -> IndexingPipeline {
    IndexingPipeline::new(store, Arc::new(HashEmbedder { dims: 8 }), locks.path().to_path_buf())
  }

  #[tokio::test]
  async fn test_index_end_to_end() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = pipeline(store.clone(), &locks);

    let report = pipeline
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(report.files_scanned, 2);
    assert!(report.chunks_created >= 2);
    assert_eq!(report.chunks_created, report.chunks_embedded);
    assert_eq!(report.project.chunk_count as usize, report.chunks_embedded);
    assert_eq!(report.project.embedding_model, "hash-embed");
    assert_eq!(report.project.embedding_dimensions, 8);

    let stored = store.count_chunks(report.project.id).unwrap();
    assert_eq!(stored as usize, report.chunks_embedded);
    assert!(!store.get_file_hashes(report.project.id).unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_reindex_without_force_fails_fast() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = pipeline(store, &locks);

    pipeline
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &CancellationToken::new())
      .await
      .unwrap();

    let err = pipeline
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::AlreadyIndexed(_)));
  }

  #[tokio::test]
  async fn test_force_reindex_same_tree_same_chunk_ids() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = pipeline(store.clone(), &locks);

    let first = pipeline
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &CancellationToken::new())
      .await
      .unwrap();

    let ids_before: BTreeSet<String> = store
      .iter_chunks_batched(first.project.id, 100, false)
      .collect::<Result<Vec<_>>>()
      .unwrap()
      .into_iter()
      .flatten()
      .map(|c| c.id.to_string())
      .collect();

    let mut force = IndexOptions::new(tree.path());
    force.force = true;
    let second = pipeline
      .index_project(force, &|_| {}, &CancellationToken::new())
      .await
      .unwrap();

    let ids_after: BTreeSet<String> = store
      .iter_chunks_batched(second.project.id, 100, false)
      .collect::<Result<Vec<_>>>()
      .unwrap()
      .into_iter()
      .flatten()
      .map(|c| c.id.to_string())
      .collect();

    assert_eq!(ids_before, ids_after);
  }

  #[tokio::test]
  async fn test_cancellation_before_store() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = pipeline(store.clone(), &locks);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = pipeline
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &cancel)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(store.list_projects().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_stage_events_fire_in_order() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let pipeline = pipeline(store, &locks);

    let stages = Mutex::new(Vec::new());
    pipeline
      .index_project(
        IndexOptions::new(tree.path()),
        &|event| {
          if let PipelineEvent::StageStarted { stage } = event
            && let Ok(mut seen) = stages.lock()
          {
            seen.push(stage);
          }
        },
        &CancellationToken::new(),
      )
      .await
      .unwrap();

    assert_eq!(
      stages.into_inner().unwrap(),
      vec![Stage::Scanning, Stage::Chunking, Stage::Embedding, Stage::Storing]
    );
  }

  #[tokio::test]
  async fn test_dimension_change_on_force_is_fatal() {
    let tree = sample_tree();
    let locks = TempDir::new().unwrap();
    let store = Arc::new(Store::open_in_memory().unwrap());

    pipeline(store.clone(), &locks)
      .index_project(IndexOptions::new(tree.path()), &|_| {}, &CancellationToken::new())
      .await
      .unwrap();

    let other = IndexingPipeline::new(
      store,
      Arc::new(HashEmbedder { dims: 16 }),
      locks.path().to_path_buf(),
    );
    let mut force = IndexOptions::new(tree.path());
    force.force = true;
    let err = other
      .index_project(force, &|_| {}, &CancellationToken::new())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 8, actual: 16 }));
  }
}
