use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::language::{FileType, Language};

/// Characters per token estimate (for LLM token counting)
pub const CHARS_PER_TOKEN: usize = 4;

/// Namespace for deterministic chunk IDs (UUIDv5).
const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0x7f3a_92d1_4c8b_4e0f_9a6d_15e2_c4b8_0a31);

/// Approximate token count. Not tokenizer-exact; all budget decisions use this.
pub fn estimate_tokens(content: &str) -> usize {
  content.len().div_ceil(CHARS_PER_TOKEN)
}

/// SHA-256 of the trimmed content, hex-encoded. Feeds stable chunk IDs.
pub fn content_hash(content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(content.trim().as_bytes());
  hex::encode(hasher.finalize())
}

/// Deterministic chunk ID: re-chunking the same segment yields the same ID.
pub fn chunk_id(project_id: Uuid, file_path: &str, start_line: u32, end_line: u32, content_hash: &str) -> Uuid {
  let key = format!("{project_id}:{file_path}:{start_line}:{end_line}:{content_hash}");
  Uuid::new_v5(&CHUNK_ID_NAMESPACE, key.as_bytes())
}

/// An indexable fragment of a source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
  pub id: Uuid,
  pub project_id: Uuid,
  /// Project-relative path.
  pub file_path: String,
  pub content: String,
  /// Empty until the embedding stage fills it; the store rejects inserts
  /// whose length disagrees with the project's dimensions.
  pub embedding: Vec<f32>,
  pub file_type: FileType,
  pub language: Option<Language>,
  /// 1-based inclusive.
  pub start_line: u32,
  pub end_line: u32,
  pub metadata: ChunkMetadata,
  pub content_hash: String,
  pub indexed_at: DateTime<Utc>,
}

impl Chunk {
  pub fn tokens_estimate(&self) -> usize {
    estimate_tokens(&self.content)
  }
}

/// Structured chunk metadata, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub symbol_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub symbol_kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  /// Set when an oversized segment was split: this is part `part` of `part_total`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub part: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub part_total: Option<u32>,
  /// Heading path for markdown chunks.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub heading: Option<String>,
}

impl ChunkMetadata {
  pub fn symbol(name: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      symbol_name: Some(name.into()),
      symbol_kind: Some(kind.into()),
      ..Default::default()
    }
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
  }

  /// Tolerant read path: corrupt metadata is logged and becomes empty.
  pub fn from_json(json: &str) -> Self {
    match serde_json::from_str(json) {
      Ok(meta) => meta,
      Err(e) => {
        tracing::warn!("Corrupt chunk metadata, using empty: {e}");
        Self::default()
      }
    }
  }
}
