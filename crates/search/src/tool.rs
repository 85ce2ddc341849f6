//! The `retrieve_knowledge` tool surface exposed to the external LLM agent.
//!
//! On failure the response is `{ "error": ... }` with no partial fields;
//! callers must tolerate both shapes.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::assemble::{AssembleOptions, Source, assemble};
use crate::coordinator::SearchCoordinator;
use crate::router::{Classification, QueryContext, QueryRouter, RoutingDecision};
use crate::types::SearchOptions;

const MAX_RESULTS_LIMIT: usize = 20;
const DEFAULT_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveKnowledgeInput {
  pub query: String,
  #[serde(default)]
  pub max_results: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSummary {
  pub method: crate::router::RoutingMethod,
  pub project_ids: Vec<String>,
  pub confidence: f32,
  pub reason: String,
}

impl From<&RoutingDecision> for RoutingSummary {
  fn from(decision: &RoutingDecision) -> Self {
    Self {
      method: decision.method,
      project_ids: decision.project_ids.iter().map(|id| id.to_string()).collect(),
      confidence: decision.confidence,
      reason: decision.reason.clone(),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveKnowledgeOutput {
  pub context: String,
  pub source_count: usize,
  pub estimated_tokens: usize,
  pub sources: Vec<Source>,
  pub routing: RoutingSummary,
  pub search_time_ms: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub classification: Option<Classification>,
}

/// Success or failure shape; serializes to exactly one of them.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
  Success(Box<RetrieveKnowledgeOutput>),
  Failure { error: String },
}

/// Execute the tool: route, retrieve, rerank, assemble. The focused project
/// is whatever the caller resolved into `ctx` at call time.
pub async fn retrieve_knowledge(
  coordinator: &SearchCoordinator,
  router: &QueryRouter,
  ctx: &QueryContext,
  input: RetrieveKnowledgeInput,
) -> ToolResponse {
  let started = Instant::now();

  if input.query.trim().is_empty() {
    return ToolResponse::Failure {
      error: "query must not be empty".to_string(),
    };
  }
  let max_results = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
  if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
    return ToolResponse::Failure {
      error: format!("maxResults must be in [1, {MAX_RESULTS_LIMIT}], got {max_results}"),
    };
  }

  let decision = router.route(&input.query, ctx).await;

  // Small-talk: success with empty context and the classification attached.
  if decision.skip_retrieval() {
    return ToolResponse::Success(Box::new(RetrieveKnowledgeOutput {
      context: String::new(),
      source_count: 0,
      estimated_tokens: 0,
      sources: Vec::new(),
      routing: RoutingSummary::from(&decision),
      search_time_ms: started.elapsed().as_millis() as u64,
      classification: decision.classification.clone(),
    }));
  }

  let opts = SearchOptions {
    top_k: max_results,
    ..Default::default()
  };
  let response = match coordinator.search(&input.query, &decision.project_ids, &opts).await {
    Ok(response) => response,
    Err(e) => {
      return ToolResponse::Failure { error: e.to_string() };
    }
  };

  let artifact = assemble(&response.hits, &AssembleOptions::default());

  ToolResponse::Success(Box::new(RetrieveKnowledgeOutput {
    context: artifact.text,
    source_count: artifact.sources.len(),
    estimated_tokens: artifact.estimated_tokens,
    sources: artifact.sources,
    routing: RoutingSummary::from(&decision),
    search_time_ms: started.elapsed().as_millis() as u64,
    classification: decision.classification.clone(),
  }))
}
