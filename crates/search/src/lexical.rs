//! Per-project BM25 index with a code-aware tokenizer.
//!
//! Parameters default to code-friendly values: lower k1 (repeated keywords
//! saturate faster) and lower b (function-sized documents need less length
//! normalization).

use bm25::{Embedder as Bm25Embedder, EmbedderBuilder, Scorer, Tokenizer};
use std::collections::HashMap;

use crate::types::{Hit, SearchFilter};
use ctx_core::{Chunk, Project, Result};
use db::Store;

#[derive(Debug, Clone)]
pub struct Bm25Params {
  pub k1: f32,
  pub b: f32,
  pub avgdl: f32,
}

impl Default for Bm25Params {
  fn default() -> Self {
    Self {
      k1: 0.8,
      b: 0.5,
      avgdl: 100.0,
    }
  }
}

/// Splits identifiers the way code reads: `camelCase`, `snake_case`, and
/// `kebab-case` all break apart; case folds; numbers survive.
#[derive(Debug, Clone, Default)]
pub struct CodeTokenizer;

impl CodeTokenizer {
  fn split_identifier(word: &str, out: &mut Vec<String>) {
    let mut current = String::new();
    let mut previous_lower = false;
    for c in word.chars() {
      if c.is_uppercase() && previous_lower && !current.is_empty() {
        out.push(current.to_lowercase());
        current = String::new();
      }
      previous_lower = c.is_lowercase() || c.is_numeric();
      current.push(c);
    }
    if !current.is_empty() {
      out.push(current.to_lowercase());
    }
  }
}

impl Tokenizer for CodeTokenizer {
  fn tokenize(&self, input_text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in input_text.split(|c: char| !c.is_alphanumeric()) {
      if word.is_empty() {
        continue;
      }
      Self::split_identifier(word, &mut tokens);
    }
    tokens
  }
}

/// BM25 index over one project's chunk text. Same lifecycle as the vector
/// store; no embeddings are ever needed here.
pub struct LexicalStore {
  project_name: String,
  embedder: Bm25Embedder<u32, CodeTokenizer>,
  scorer: Scorer<String, u32>,
  entries: HashMap<String, Chunk>,
  doc_lengths_total: u64,
  params: Bm25Params,
}

impl LexicalStore {
  pub fn new(project_name: impl Into<String>, params: Bm25Params) -> Self {
    Self {
      project_name: project_name.into(),
      embedder: build_embedder(&params),
      scorer: Scorer::new(),
      entries: HashMap::new(),
      doc_lengths_total: 0,
      params,
    }
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn insert(&mut self, chunks: Vec<Chunk>) {
    let tokenizer = CodeTokenizer;
    for chunk in chunks {
      let id = chunk.id.to_string();
      let embedding = self.embedder.embed(&chunk.content);
      self.scorer.upsert(&id, embedding);
      self.doc_lengths_total += tokenizer.tokenize(&chunk.content).len() as u64;
      self.entries.insert(id, chunk);
    }
  }

  /// Recompute avgdl from the corpus and rebuild the embedder with it. The
  /// scorer keeps its per-document embeddings; query-side weighting adjusts.
  pub fn finish(&mut self) {
    if self.entries.is_empty() {
      return;
    }
    self.params.avgdl = (self.doc_lengths_total as f32 / self.entries.len() as f32).max(1.0);
    self.embedder = build_embedder(&self.params);
  }

  pub fn search(&self, query: &str, top_k: usize, filter: &SearchFilter) -> Result<Vec<Hit>> {
    if top_k == 0 || self.entries.is_empty() {
      return Ok(Vec::new());
    }

    let query_embedding = self.embedder.embed(query);
    let matches = self.scorer.matches(&query_embedding);

    let hits = matches
      .into_iter()
      .filter_map(|scored| {
        let chunk = self.entries.get(&scored.id)?;
        if !filter.accepts(chunk.file_type, chunk.language, chunk.project_id) {
          return None;
        }
        if filter.min_score.is_some_and(|min| scored.score < min) {
          return None;
        }
        Some(Hit::from_chunk(chunk, &self.project_name, scored.score))
      })
      .take(top_k)
      .collect();

    Ok(hits)
  }
}

fn build_embedder(params: &Bm25Params) -> Bm25Embedder<u32, CodeTokenizer> {
  EmbedderBuilder::<u32, CodeTokenizer>::with_avgdl(params.avgdl)
    .b(params.b)
    .k1(params.k1)
    .build()
}

/// Load a project's lexical index via the skip-embedding read path.
pub fn build_lexical_index(store: &Store, project: &Project, params: Bm25Params) -> Result<LexicalStore> {
  let mut index = LexicalStore::new(&project.name, params);
  for batch in store.iter_chunks_batched(project.id, 1000, false) {
    index.insert(batch?);
  }
  index.finish();
  tracing::debug!("Built lexical index for '{}' with {} chunks", project.name, index.len());
  Ok(index)
}
