//! Context assembly: token-budgeted packing of ranked hits into a single
//! citable artifact.

use serde::Serialize;

use crate::types::Hit;
use ctx_core::{FileType, Language, estimate_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingPolicy {
  /// Highest relevance at the extremities; counters LLM position bias.
  Sandwich,
  ScoreDesc,
  FileGrouped,
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
  pub token_budget: usize,
  pub ordering: OrderingPolicy,
}

impl Default for AssembleOptions {
  fn default() -> Self {
    Self {
      token_budget: 4000,
      ordering: OrderingPolicy::Sandwich,
    }
  }
}

/// Citation entry for one emitted source block.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
  /// 1-based, in emission order.
  pub index: usize,
  pub file_path: String,
  pub project: String,
  pub start_line: u32,
  pub end_line: u32,
  pub score: f32,
  pub language: Option<Language>,
  pub file_type: FileType,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextArtifact {
  pub text: String,
  pub sources: Vec<Source>,
  pub estimated_tokens: usize,
}

impl ContextArtifact {
  fn empty() -> Self {
    Self {
      text: String::new(),
      sources: Vec::new(),
      estimated_tokens: 0,
    }
  }
}

/// Greedy-pack hits in the policy order until the next chunk would exceed the
/// budget. Chunks are never split; if nothing fits the artifact is empty.
pub fn assemble(hits: &[Hit], opts: &AssembleOptions) -> ContextArtifact {
  assemble_with_estimator(hits, opts, estimate_tokens)
}

/// Same as [`assemble`] but with a caller-supplied token estimator, for
/// callers that need tokenizer-exact budgets.
pub fn assemble_with_estimator(
  hits: &[Hit],
  opts: &AssembleOptions,
  estimator: impl Fn(&str) -> usize,
) -> ContextArtifact {
  if hits.is_empty() {
    return ContextArtifact::empty();
  }

  let ordered = order_hits(hits, opts.ordering);

  let mut included: Vec<&Hit> = Vec::new();
  let mut used_tokens = 0usize;
  for hit in ordered {
    let cost = estimator(&hit.content);
    if used_tokens + cost > opts.token_budget {
      break;
    }
    used_tokens += cost;
    included.push(hit);
  }

  if included.is_empty() {
    return ContextArtifact::empty();
  }

  let mut text = String::from("<sources>\n");
  let mut sources = Vec::with_capacity(included.len());
  for (i, hit) in included.iter().enumerate() {
    let index = i + 1;
    let lang = hit.language.map(|l| l.as_str()).unwrap_or("");
    text.push_str(&format!(
      "<source id=\"{index}\" path=\"{}\" lines=\"{}-{}\" lang=\"{lang}\" score=\"{:.3}\">\n",
      hit.file_path, hit.start_line, hit.end_line, hit.score
    ));
    text.push_str(hit.content.trim_end());
    text.push_str("\n</source>\n");

    sources.push(Source {
      index,
      file_path: hit.file_path.clone(),
      project: hit.project_name.clone(),
      start_line: hit.start_line,
      end_line: hit.end_line,
      score: hit.score,
      language: hit.language,
      file_type: hit.file_type,
    });
  }
  text.push_str("</sources>");

  ContextArtifact {
    text,
    sources,
    estimated_tokens: used_tokens,
  }
}

/// Order hits per the policy. Sandwich falls back to score-desc below four
/// hits, where the split is meaningless.
fn order_hits(hits: &[Hit], policy: OrderingPolicy) -> Vec<&Hit> {
  let mut by_score: Vec<&Hit> = hits.iter().collect();
  by_score.sort_by(|a, b| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| a.chunk_id.to_string().cmp(&b.chunk_id.to_string()))
  });

  match policy {
    OrderingPolicy::ScoreDesc => by_score,
    OrderingPolicy::Sandwich => {
      if by_score.len() < 4 {
        return by_score;
      }
      let split = by_score.len() / 2;
      let (top, rest) = by_score.split_at(split);
      let mut ordered: Vec<&Hit> = top.to_vec();
      ordered.extend(rest.iter().rev());
      ordered
    }
    OrderingPolicy::FileGrouped => {
      // Files ordered by their best hit; hits within a file by line.
      let mut files: Vec<&str> = Vec::new();
      for hit in &by_score {
        if !files.contains(&hit.file_path.as_str()) {
          files.push(&hit.file_path);
        }
      }
      let mut ordered = Vec::with_capacity(by_score.len());
      for file in files {
        let mut in_file: Vec<&Hit> = by_score.iter().copied().filter(|h| h.file_path == file).collect();
        in_file.sort_by_key(|h| h.start_line);
        ordered.extend(in_file);
      }
      ordered
    }
  }
}
