use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// An indexed source tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub id: Uuid,
  /// Human name, unique within the store.
  pub name: String,
  /// Absolute canonical path of the indexed root.
  pub path: PathBuf,
  pub description: Option<String>,
  pub tags: Vec<String>,
  pub ignore_patterns: Vec<String>,
  /// Embedding contract set at first indexing; searches must match it.
  pub embedding_model: String,
  pub embedding_dimensions: usize,
  pub file_count: u32,
  pub chunk_count: u32,
  pub indexed_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Project {
  pub fn new(name: impl Into<String>, path: PathBuf, embedding_model: impl Into<String>, dimensions: usize) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      name: name.into(),
      path,
      description: None,
      tags: Vec::new(),
      ignore_patterns: Vec::new(),
      embedding_model: embedding_model.into(),
      embedding_dimensions: dimensions,
      file_count: 0,
      chunk_count: 0,
      indexed_at: now,
      updated_at: now,
    }
  }
}
