//! Per-project dense index: HNSW by default, brute-force cosine for tiny
//! projects or when HNSW is disabled.

use hnsw_rs::prelude::*;
use uuid::Uuid;

use crate::types::{Hit, SearchFilter};
use ctx_core::{Chunk, Error, Project, Result};
use db::Store;

#[derive(Debug, Clone)]
pub struct VectorIndexConfig {
  pub max_connections: usize,
  pub ef_construction: usize,
  pub ef_search: usize,
  /// Below this many chunks, brute force beats graph traversal.
  pub brute_force_threshold: usize,
  pub disable_hnsw: bool,
}

impl Default for VectorIndexConfig {
  fn default() -> Self {
    Self {
      max_connections: 16,
      ef_construction: 200,
      ef_search: 100,
      brute_force_threshold: 128,
      disable_hnsw: false,
    }
  }
}

enum Backend {
  Hnsw(Hnsw<'static, f32, DistCosine>),
  Brute,
}

/// Dense index over one project's chunks. Build once, search many.
pub struct VectorStore {
  project_name: String,
  dimensions: usize,
  config: VectorIndexConfig,
  entries: Vec<Chunk>,
  backend: Backend,
}

impl VectorStore {
  pub fn new(project_name: impl Into<String>, dimensions: usize, config: VectorIndexConfig) -> Self {
    Self {
      project_name: project_name.into(),
      dimensions,
      config,
      entries: Vec::new(),
      backend: Backend::Brute,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Insert chunks, validating every vector against the declared dimensions.
  pub fn insert(&mut self, chunks: Vec<Chunk>) -> Result<()> {
    for chunk in &chunks {
      if chunk.embedding.len() != self.dimensions {
        return Err(Error::DimensionMismatch {
          expected: self.dimensions,
          actual: chunk.embedding.len(),
        });
      }
    }
    self.entries.extend(chunks);
    Ok(())
  }

  /// Build the ANN structure once all inserts are done.
  pub fn finish(&mut self) {
    if self.config.disable_hnsw || self.entries.len() < self.config.brute_force_threshold {
      self.backend = Backend::Brute;
      return;
    }

    let hnsw = Hnsw::<f32, DistCosine>::new(
      self.config.max_connections,
      self.entries.len().max(1),
      16,
      self.config.ef_construction,
      DistCosine {},
    );
    let data: Vec<(&Vec<f32>, usize)> = self.entries.iter().enumerate().map(|(i, c)| (&c.embedding, i)).collect();
    hnsw.parallel_insert(&data);
    self.backend = Backend::Hnsw(hnsw);
  }

  /// Nearest chunks by cosine similarity, filtered, scores in [0, 1].
  pub fn search(&self, query: &[f32], top_k: usize, filter: &SearchFilter) -> Result<Vec<Hit>> {
    if query.len() != self.dimensions {
      return Err(Error::DimensionMismatch {
        expected: self.dimensions,
        actual: query.len(),
      });
    }
    if top_k == 0 || self.entries.is_empty() {
      return Ok(Vec::new());
    }

    let scored: Vec<(usize, f32)> = match &self.backend {
      Backend::Hnsw(hnsw) => {
        // Over-fetch so post-filtering can still fill top_k.
        let fetch = (top_k * 4).min(self.entries.len());
        hnsw
          .search(query, fetch, self.config.ef_search)
          .into_iter()
          .map(|neighbour| (neighbour.d_id, normalize_cosine_distance(neighbour.distance)))
          .collect()
      }
      Backend::Brute => {
        let mut scored: Vec<(usize, f32)> = self
          .entries
          .iter()
          .enumerate()
          .map(|(i, chunk)| (i, normalize_cosine_similarity(cosine_similarity(query, &chunk.embedding))))
          .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
      }
    };

    let hits = scored
      .into_iter()
      .filter_map(|(index, score)| {
        let chunk = self.entries.get(index)?;
        if !filter.accepts(chunk.file_type, chunk.language, chunk.project_id) {
          return None;
        }
        if filter.min_score.is_some_and(|min| score < min) {
          return None;
        }
        Some(Hit::from_chunk(chunk, &self.project_name, score))
      })
      .take(top_k)
      .collect();

    Ok(hits)
  }
}

/// Map cosine similarity from [-1, 1] to [0, 1].
fn normalize_cosine_similarity(similarity: f32) -> f32 {
  (similarity + 1.0) / 2.0
}

/// hnsw_rs reports cosine distance (1 - similarity).
fn normalize_cosine_distance(distance: f32) -> f32 {
  normalize_cosine_similarity(1.0 - distance)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  let mut dot = 0.0f32;
  let mut norm_a = 0.0f32;
  let mut norm_b = 0.0f32;
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Load a project's dense index from the store in batches, fail-fast on any
/// blob whose width disagrees with the project's dimensions.
pub fn build_vector_index(store: &Store, project: &Project, config: VectorIndexConfig) -> Result<VectorStore> {
  let mut index = VectorStore::new(&project.name, project.embedding_dimensions, config);
  for batch in store.iter_chunks_batched(project.id, 1000, true) {
    index.insert(batch?)?;
  }
  index.finish();
  tracing::debug!("Built vector index for '{}' with {} chunks", project.name, index.len());
  Ok(index)
}
