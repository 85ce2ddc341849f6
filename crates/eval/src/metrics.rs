//! Retrieval quality metrics over ranked file lists, binary relevance.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-query metrics at a fixed k.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
  pub reciprocal_rank: f64,
  pub precision_at_k: f64,
  pub recall_at_k: f64,
  pub hit_rate: f64,
  pub ndcg_at_k: f64,
  pub average_precision: f64,
}

impl QueryMetrics {
  /// Compute all metrics for one query. `retrieved` must already be
  /// deduplicated in rank order; only the first `k` entries count.
  pub fn compute(retrieved: &[String], expected: &[String], k: usize) -> Self {
    let top_k: Vec<&String> = retrieved.iter().take(k).collect();
    let expected_set: HashSet<&String> = expected.iter().collect();

    let relevant_ranks: Vec<usize> = top_k
      .iter()
      .enumerate()
      .filter(|(_, path)| expected_set.contains(*path))
      .map(|(i, _)| i + 1)
      .collect();

    let relevant_found = relevant_ranks.len();

    let reciprocal_rank = relevant_ranks.first().map(|rank| 1.0 / *rank as f64).unwrap_or(0.0);

    let precision_at_k = if top_k.is_empty() {
      0.0
    } else {
      relevant_found as f64 / k.min(top_k.len()) as f64
    };

    let recall_at_k = if expected.is_empty() {
      0.0
    } else {
      relevant_found as f64 / expected.len() as f64
    };

    let hit_rate = if relevant_found > 0 { 1.0 } else { 0.0 };

    let ndcg_at_k = ndcg(&relevant_ranks, expected.len(), k);

    // Mean of precision@rank over relevant ranks, normalized by the number
    // of relevant documents reachable within k.
    let average_precision = if expected.is_empty() {
      0.0
    } else {
      let sum: f64 = relevant_ranks
        .iter()
        .enumerate()
        .map(|(i, rank)| (i + 1) as f64 / *rank as f64)
        .sum();
      sum / expected.len().min(k) as f64
    };

    Self {
      reciprocal_rank,
      precision_at_k,
      recall_at_k,
      hit_rate,
      ndcg_at_k,
      average_precision,
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
  }
}

fn ndcg(relevant_ranks: &[usize], expected_count: usize, k: usize) -> f64 {
  if expected_count == 0 {
    return 0.0;
  }
  let dcg: f64 = relevant_ranks.iter().map(|rank| 1.0 / ((*rank as f64) + 1.0).log2()).sum();
  let ideal: f64 = (1..=expected_count.min(k))
    .map(|rank| 1.0 / ((rank as f64) + 1.0).log2())
    .sum();
  if ideal == 0.0 { 0.0 } else { dcg / ideal }
}

/// Simple means across queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateMetrics {
  pub mrr: f64,
  pub precision_at_k: f64,
  pub recall_at_k: f64,
  pub hit_rate: f64,
  pub ndcg_at_k: f64,
  pub map: f64,
}

impl AggregateMetrics {
  pub fn from_queries(metrics: &[QueryMetrics]) -> Self {
    if metrics.is_empty() {
      return Self::default();
    }
    let n = metrics.len() as f64;
    Self {
      mrr: metrics.iter().map(|m| m.reciprocal_rank).sum::<f64>() / n,
      precision_at_k: metrics.iter().map(|m| m.precision_at_k).sum::<f64>() / n,
      recall_at_k: metrics.iter().map(|m| m.recall_at_k).sum::<f64>() / n,
      hit_rate: metrics.iter().map(|m| m.hit_rate).sum::<f64>() / n,
      ndcg_at_k: metrics.iter().map(|m| m.ndcg_at_k).sum::<f64>() / n,
      map: metrics.iter().map(|m| m.average_precision).sum::<f64>() / n,
    }
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
  }

  /// Per-metric deltas against a previous run (self minus previous).
  pub fn deltas(&self, previous: &AggregateMetrics) -> Vec<(&'static str, f64)> {
    vec![
      ("mrr", self.mrr - previous.mrr),
      ("precision_at_k", self.precision_at_k - previous.precision_at_k),
      ("recall_at_k", self.recall_at_k - previous.recall_at_k),
      ("hit_rate", self.hit_rate - previous.hit_rate),
      ("ndcg_at_k", self.ndcg_at_k - previous.ndcg_at_k),
      ("map", self.map - previous.map),
    ]
  }
}
