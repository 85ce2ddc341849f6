//! Retrieval option structs, filters, and the hit type shared across stores.

use serde::Serialize;
use uuid::Uuid;

use ctx_core::{Chunk, ChunkMetadata, Error, FileType, Language, Result};

/// Filter value: exact match or membership.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
  Eq(String),
  In(Vec<String>),
}

impl FilterValue {
  pub fn matches(&self, value: &str) -> bool {
    match self {
      FilterValue::Eq(expected) => expected.eq_ignore_ascii_case(value),
      FilterValue::In(set) => set.iter().any(|candidate| candidate.eq_ignore_ascii_case(value)),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
  pub file_type: Option<FilterValue>,
  pub language: Option<FilterValue>,
  /// Empty means "no filter".
  pub project_ids: Vec<Uuid>,
  /// Applied to final (post-rerank) scores.
  pub min_score: Option<f32>,
}

impl SearchFilter {
  /// Structural checks applied at each retriever and re-checked after merge.
  pub fn accepts(&self, file_type: FileType, language: Option<Language>, project_id: Uuid) -> bool {
    if let Some(filter) = &self.file_type
      && !filter.matches(file_type.as_str())
    {
      return false;
    }
    if let Some(filter) = &self.language {
      let Some(language) = language else { return false };
      if !filter.matches(language.as_str()) {
        return false;
      }
    }
    if !self.project_ids.is_empty() && !self.project_ids.contains(&project_id) {
      return false;
    }
    true
  }
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
  /// Final result count.
  pub top_k: usize,
  /// Over-fetch per project before fusion.
  pub top_k_per_project: usize,
  /// Fused results offered to the reranker.
  pub candidate_count: usize,
  pub rerank: bool,
  pub filter: SearchFilter,
}

impl Default for SearchOptions {
  fn default() -> Self {
    Self {
      top_k: 10,
      top_k_per_project: 20,
      candidate_count: 50,
      rerank: true,
      filter: SearchFilter::default(),
    }
  }
}

impl SearchOptions {
  /// Fail fast on nonsensical options before any retrieval work.
  pub fn validate(&self) -> Result<()> {
    if self.top_k > 100 {
      return Err(Error::Validation(format!("top_k must be <= 100, got {}", self.top_k)));
    }
    if self.top_k_per_project == 0 {
      return Err(Error::Validation("top_k_per_project must be >= 1".to_string()));
    }
    if let Some(min_score) = self.filter.min_score
      && !(0.0..=1.0).contains(&min_score)
    {
      return Err(Error::Validation(format!("min_score must be in [0, 1], got {min_score}")));
    }
    Ok(())
  }
}

/// A retrieval hit, hydrated and attributable.
#[derive(Debug, Clone, Serialize)]
pub struct Hit {
  pub chunk_id: Uuid,
  pub project_id: Uuid,
  pub project_name: String,
  pub file_path: String,
  pub content: String,
  pub file_type: FileType,
  pub language: Option<Language>,
  pub start_line: u32,
  pub end_line: u32,
  pub score: f32,
  pub metadata: ChunkMetadata,
}

impl Hit {
  pub fn from_chunk(chunk: &Chunk, project_name: &str, score: f32) -> Self {
    Self {
      chunk_id: chunk.id,
      project_id: chunk.project_id,
      project_name: project_name.to_string(),
      file_path: chunk.file_path.clone(),
      content: chunk.content.clone(),
      file_type: chunk.file_type,
      language: chunk.language,
      start_line: chunk.start_line,
      end_line: chunk.end_line,
      score,
      metadata: chunk.metadata.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filter_value_matching() {
    assert!(FilterValue::Eq("code".to_string()).matches("code"));
    assert!(FilterValue::Eq("Code".to_string()).matches("code"));
    assert!(!FilterValue::Eq("docs".to_string()).matches("code"));
    assert!(FilterValue::In(vec!["rust".to_string(), "go".to_string()]).matches("go"));
    assert!(!FilterValue::In(vec!["rust".to_string()]).matches("python"));
  }

  #[test]
  fn test_filter_accepts() {
    let project = Uuid::new_v4();
    let other = Uuid::new_v4();
    let filter = SearchFilter {
      file_type: Some(FilterValue::Eq("code".to_string())),
      language: Some(FilterValue::In(vec!["rust".to_string()])),
      project_ids: vec![project],
      min_score: None,
    };

    assert!(filter.accepts(FileType::Code, Some(Language::Rust), project));
    assert!(!filter.accepts(FileType::Docs, Some(Language::Rust), project));
    assert!(!filter.accepts(FileType::Code, Some(Language::Go), project));
    assert!(!filter.accepts(FileType::Code, None, project));
    assert!(!filter.accepts(FileType::Code, Some(Language::Rust), other));
  }

  #[test]
  fn test_empty_project_filter_accepts_all() {
    let filter = SearchFilter::default();
    assert!(filter.accepts(FileType::Data, None, Uuid::new_v4()));
  }

  #[test]
  fn test_options_validation() {
    SearchOptions::default().validate().unwrap();

    let mut opts = SearchOptions::default();
    opts.top_k = 101;
    assert!(opts.validate().is_err());

    let mut opts = SearchOptions::default();
    opts.filter.min_score = Some(1.5);
    assert!(opts.validate().is_err());
  }
}
