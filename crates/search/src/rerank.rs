//! Cross-encoder reranking with deterministic score normalization.

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::Hit;
use ctx_core::Result;
use embedding::Embedder;

/// Score range below which raw scores are considered collapsed.
const SCORE_EPSILON: f32 = 1e-6;

/// Scores (query, document) pairs. Implementations return raw scores in
/// [0, 1], one per document, in input order.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
  async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>>;
}

/// Default scorer: embeds the query and candidates through the configured
/// embedding provider and midpoint-normalizes cosine similarity into [0, 1].
pub struct EmbeddingCrossEncoder {
  embedder: Arc<dyn Embedder>,
}

impl EmbeddingCrossEncoder {
  pub fn new(embedder: Arc<dyn Embedder>) -> Self {
    Self { embedder }
  }
}

#[async_trait]
impl CrossEncoder for EmbeddingCrossEncoder {
  async fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>> {
    if documents.is_empty() {
      return Ok(Vec::new());
    }
    let query_vec = self.embedder.embed(query).await.map_err(ctx_core::Error::from)?;
    let doc_vecs = self
      .embedder
      .embed_batch(documents)
      .await
      .map_err(ctx_core::Error::from)?;

    Ok(
      doc_vecs
        .iter()
        .map(|doc| (cosine(&query_vec, doc) + 1.0) / 2.0)
        .collect(),
    )
  }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
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

pub struct Reranker {
  encoder: Arc<dyn CrossEncoder>,
  candidate_count: usize,
}

impl Reranker {
  pub fn new(encoder: Arc<dyn CrossEncoder>, candidate_count: usize) -> Self {
    Self {
      encoder,
      candidate_count: candidate_count.max(1),
    }
  }

  /// Rerank the top candidates; hits beyond the candidate window keep their
  /// fused order below the reranked block.
  pub async fn rerank(&self, query: &str, hits: Vec<Hit>) -> Result<Vec<Hit>> {
    if hits.len() < 2 {
      return Ok(hits);
    }

    let split = self.candidate_count.min(hits.len());
    let mut candidates = hits;
    let tail = candidates.split_off(split);

    let documents: Vec<&str> = candidates.iter().map(|h| h.content.as_str()).collect();
    let raw_scores = self.encoder.score(query, &documents).await?;

    let mut reranked = apply_scores(candidates, &raw_scores);
    reranked.extend(tail);
    Ok(reranked)
  }
}

/// Order candidates by raw score and assign normalized scores.
///
/// When the raw range exceeds epsilon, scores are min-max normalized to
/// [0, 1]. When the model's scores collapse, rank-based pseudo-scores keep
/// the ordering meaningful: top = 1.0 down to 0.5 at the bottom.
pub fn apply_scores(candidates: Vec<Hit>, raw_scores: &[f32]) -> Vec<Hit> {
  // Deterministic ordering: raw score desc, prior rank asc, id asc.
  let mut indexed: Vec<(usize, Hit, f32)> = candidates
    .into_iter()
    .zip(raw_scores.iter().copied())
    .enumerate()
    .map(|(prior_rank, (hit, raw))| (prior_rank, hit, raw))
    .collect();
  indexed.sort_by(|a, b| {
    b.2
      .partial_cmp(&a.2)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.0.cmp(&b.0))
      .then_with(|| a.1.chunk_id.to_string().cmp(&b.1.chunk_id.to_string()))
  });

  let n = indexed.len();
  let max = indexed.iter().map(|e| e.2).fold(f32::MIN, f32::max);
  let min = indexed.iter().map(|e| e.2).fold(f32::MAX, f32::min);
  let range = max - min;

  indexed
    .into_iter()
    .enumerate()
    .map(|(rank, (_, mut hit, raw))| {
      hit.score = if range > SCORE_EPSILON {
        (raw - min) / range
      } else if n == 1 {
        1.0
      } else {
        1.0 - (rank as f32 / (n as f32 - 1.0)) * 0.5
      };
      hit
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use ctx_core::{ChunkMetadata, FileType};
  use uuid::Uuid;

  fn hit(id: u128, content: &str) -> Hit {
    Hit {
      chunk_id: Uuid::from_u128(id),
      project_id: Uuid::from_u128(1),
      project_name: "test".to_string(),
      file_path: format!("src/{id}.rs"),
      content: content.to_string(),
      file_type: FileType::Code,
      language: None,
      start_line: 1,
      end_line: 1,
      score: 0.0,
      metadata: ChunkMetadata::default(),
    }
  }

  #[test]
  fn test_min_max_normalization() {
    let candidates = vec![hit(1, "a"), hit(2, "b"), hit(3, "c")];
    let scored = apply_scores(candidates, &[0.2, 0.8, 0.5]);

    assert_eq!(scored[0].chunk_id, Uuid::from_u128(2));
    assert!((scored[0].score - 1.0).abs() < 1e-6);
    assert_eq!(scored[1].chunk_id, Uuid::from_u128(3));
    assert!((scored[1].score - 0.5).abs() < 1e-6);
    assert_eq!(scored[2].chunk_id, Uuid::from_u128(1));
    assert!((scored[2].score - 0.0).abs() < 1e-6);
  }

  #[test]
  fn test_collapsed_scores_fall_back_to_rank_pseudo_scores() {
    let candidates = vec![hit(1, "a"), hit(2, "b"), hit(3, "c"), hit(4, "d"), hit(5, "e")];
    let scored = apply_scores(candidates, &[0.732; 5]);

    // Order preserved (prior rank breaks the tie), scores stepped.
    let ids: Vec<_> = scored.iter().map(|h| h.chunk_id).collect();
    assert_eq!(
      ids,
      vec![
        Uuid::from_u128(1),
        Uuid::from_u128(2),
        Uuid::from_u128(3),
        Uuid::from_u128(4),
        Uuid::from_u128(5)
      ]
    );
    let scores: Vec<f32> = scored.iter().map(|h| h.score).collect();
    let expected = [1.0, 0.875, 0.75, 0.625, 0.5];
    for (score, expected) in scores.iter().zip(expected) {
      assert!((score - expected).abs() < 1e-6, "got {scores:?}");
    }
  }

  #[test]
  fn test_single_candidate_scores_one() {
    let scored = apply_scores(vec![hit(1, "a")], &[0.4]);
    assert!((scored[0].score - 1.0).abs() < 1e-6);
  }

  #[tokio::test]
  async fn test_reranker_keeps_tail_after_candidates() {
    struct ReverseEncoder;
    #[async_trait]
    impl CrossEncoder for ReverseEncoder {
      async fn score(&self, _query: &str, documents: &[&str]) -> Result<Vec<f32>> {
        // Later documents score higher.
        Ok((0..documents.len()).map(|i| i as f32 / documents.len() as f32).collect())
      }
    }

    let reranker = Reranker::new(Arc::new(ReverseEncoder), 3);
    let hits = vec![hit(1, "a"), hit(2, "b"), hit(3, "c"), hit(4, "tail"), hit(5, "tail2")];
    let reranked = reranker.rerank("query", hits).await.unwrap();

    // First three reversed by the encoder; tail untouched at the end.
    let ids: Vec<_> = reranked.iter().map(|h| h.chunk_id).collect();
    assert_eq!(
      ids,
      vec![
        Uuid::from_u128(3),
        Uuid::from_u128(2),
        Uuid::from_u128(1),
        Uuid::from_u128(4),
        Uuid::from_u128(5)
      ]
    );
  }

  #[tokio::test]
  async fn test_reranker_passthrough_for_tiny_input() {
    struct PanicEncoder;
    #[async_trait]
    impl CrossEncoder for PanicEncoder {
      async fn score(&self, _query: &str, _documents: &[&str]) -> Result<Vec<f32>> {
        panic!("should not be called");
      }
    }

    let reranker = Reranker::new(Arc::new(PanicEncoder), 50);
    let hits = vec![hit(1, "only")];
    let reranked = reranker.rerank("query", hits).await.unwrap();
    assert_eq!(reranked.len(), 1);
  }
}
