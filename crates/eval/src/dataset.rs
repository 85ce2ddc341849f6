//! Golden dataset loading and validation (schema v1.0).

use serde::{Deserialize, Serialize};
use std::path::Path;

use ctx_core::{Error, EvalError, Result};

pub const SUPPORTED_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenDataset {
  pub version: String,
  pub entries: Vec<GoldenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenEntry {
  pub id: String,
  pub query: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub expected_file_paths: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub expected_answer: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
}

impl GoldenDataset {
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Err(Error::Eval(EvalError::DatasetNotFound(path.display().to_string())));
    }
    let raw = std::fs::read_to_string(path)?;
    let dataset: GoldenDataset =
      serde_json::from_str(&raw).map_err(|e| Error::Eval(EvalError::DatasetInvalid(e.to_string())))?;
    dataset.validate()?;
    Ok(dataset)
  }

  /// Schema checks, done before any retrieval work.
  pub fn validate(&self) -> Result<()> {
    if self.version != SUPPORTED_VERSION {
      return Err(Error::Eval(EvalError::DatasetInvalid(format!(
        "unsupported dataset version '{}', expected '{SUPPORTED_VERSION}'",
        self.version
      ))));
    }
    if self.entries.is_empty() {
      return Err(Error::Eval(EvalError::DatasetInvalid("dataset has no entries".to_string())));
    }
    if !self.entries.iter().any(|e| !e.expected_file_paths.is_empty()) {
      return Err(Error::Eval(EvalError::DatasetInvalid(
        "no entry declares expectedFilePaths; nothing is measurable".to_string(),
      )));
    }
    let mut seen = std::collections::HashSet::new();
    for entry in &self.entries {
      if entry.query.trim().is_empty() {
        return Err(Error::Eval(EvalError::DatasetInvalid(format!(
          "entry '{}' has an empty query",
          entry.id
        ))));
      }
      if !seen.insert(&entry.id) {
        return Err(Error::Eval(EvalError::DatasetInvalid(format!(
          "duplicate entry id '{}'",
          entry.id
        ))));
      }
    }
    Ok(())
  }

  /// Entries matching any of the requested tags; no tags means everything.
  pub fn filter_by_tags(&self, tags: &[String]) -> Vec<&GoldenEntry> {
    if tags.is_empty() {
      return self.entries.iter().collect();
    }
    self
      .entries
      .iter()
      .filter(|entry| entry.tags.iter().any(|t| tags.contains(t)))
      .collect()
  }
}
