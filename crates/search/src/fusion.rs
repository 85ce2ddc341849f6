//! Reciprocal Rank Fusion.
//!
//! `score(doc) = sum over lists of 1 / (k + rank)`, rank starting at 1.
//! Ties break by lower minimum rank, then lexicographic id, which keeps the
//! fused order independent of list order.

use std::collections::HashMap;
use uuid::Uuid;

use crate::types::Hit;

pub const RRF_K: f32 = 60.0;

struct FusedEntry {
  /// First occurrence across lists; defines origin attribution.
  hit: Hit,
  score: f32,
  min_rank: usize,
}

/// Fuse ranked lists. Input hit scores are ignored; output scores are the RRF
/// scores.
pub fn rrf_fuse(lists: &[Vec<Hit>], k: f32) -> Vec<Hit> {
  let mut entries: HashMap<Uuid, FusedEntry> = HashMap::new();
  // Insertion order of first occurrences, so attribution is deterministic.
  let mut order: Vec<Uuid> = Vec::new();

  for list in lists {
    for (i, hit) in list.iter().enumerate() {
      let rank = i + 1;
      let contribution = 1.0 / (k + rank as f32);
      match entries.get_mut(&hit.chunk_id) {
        Some(entry) => {
          entry.score += contribution;
          entry.min_rank = entry.min_rank.min(rank);
        }
        None => {
          order.push(hit.chunk_id);
          entries.insert(
            hit.chunk_id,
            FusedEntry {
              hit: hit.clone(),
              score: contribution,
              min_rank: rank,
            },
          );
        }
      }
    }
  }

  let mut fused: Vec<FusedEntry> = order
    .into_iter()
    .filter_map(|id| entries.remove(&id))
    .collect();

  fused.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.min_rank.cmp(&b.min_rank))
      .then_with(|| a.hit.chunk_id.to_string().cmp(&b.hit.chunk_id.to_string()))
  });

  fused
    .into_iter()
    .map(|entry| {
      let mut hit = entry.hit;
      hit.score = entry.score;
      hit
    })
    .collect()
}
