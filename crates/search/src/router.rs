//! Query routing: decide which projects a query targets.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use ctx_core::{Project, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMethod {
  Focused,
  Heuristic,
  Classifier,
  All,
}

impl RoutingMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      RoutingMethod::Focused => "focused",
      RoutingMethod::Heuristic => "heuristic",
      RoutingMethod::Classifier => "classifier",
      RoutingMethod::All => "all",
    }
  }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
  pub method: RoutingMethod,
  pub project_ids: Vec<Uuid>,
  pub confidence: f32,
  pub reason: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub classification: Option<Classification>,
}

impl RoutingDecision {
  pub fn skip_retrieval(&self) -> bool {
    self
      .classification
      .as_ref()
      .is_some_and(|c| c.skipped_retrieval)
  }
}

/// Classifier verdict surfaced to tool callers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
  #[serde(rename = "type")]
  pub query_type: String,
  pub confidence: f32,
  pub skipped_retrieval: bool,
}

/// Optional LLM-backed classifier; the implementation lives outside the core.
#[async_trait]
pub trait QueryClassifier: Send + Sync {
  async fn classify(&self, query: &str, projects: &[Project]) -> Result<ClassifierVerdict>;
}

#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
  pub project_ids: Vec<Uuid>,
  pub confidence: f32,
  pub skip_retrieval: bool,
  pub query_type: String,
}

/// Caller-supplied routing context, resolved at call time.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
  pub focused: Option<Project>,
  pub all_projects: Vec<Project>,
}

#[derive(Default)]
pub struct QueryRouter {
  classifier: Option<Arc<dyn QueryClassifier>>,
}

impl QueryRouter {
  pub fn new() -> Self {
    Self { classifier: None }
  }

  pub fn with_classifier(mut self, classifier: Arc<dyn QueryClassifier>) -> Self {
    self.classifier = Some(classifier);
    self
  }

  /// Routing ladder: focused project, name/tag heuristic, classifier, all.
  pub async fn route(&self, query: &str, ctx: &QueryContext) -> RoutingDecision {
    if let Some(focused) = &ctx.focused
      && !mentions_other_project(query, focused, &ctx.all_projects)
    {
      return RoutingDecision {
        method: RoutingMethod::Focused,
        project_ids: vec![focused.id],
        confidence: 1.0,
        reason: format!("focused on '{}'", focused.name),
        classification: None,
      };
    }

    let matches = heuristic_matches(query, &ctx.all_projects);
    if !matches.is_empty() {
      let names: Vec<&str> = ctx
        .all_projects
        .iter()
        .filter(|p| matches.contains(&p.id))
        .map(|p| p.name.as_str())
        .collect();
      return RoutingDecision {
        method: RoutingMethod::Heuristic,
        project_ids: matches,
        confidence: 0.9,
        reason: format!("query mentions {}", names.join(", ")),
        classification: None,
      };
    }

    if let Some(classifier) = &self.classifier {
      match classifier.classify(query, &ctx.all_projects).await {
        Ok(verdict) => {
          return RoutingDecision {
            method: RoutingMethod::Classifier,
            project_ids: if verdict.skip_retrieval {
              Vec::new()
            } else if verdict.project_ids.is_empty() {
              ctx.all_projects.iter().map(|p| p.id).collect()
            } else {
              verdict.project_ids.clone()
            },
            confidence: verdict.confidence,
            reason: format!("classifier: {}", verdict.query_type),
            classification: Some(Classification {
              query_type: verdict.query_type,
              confidence: verdict.confidence,
              skipped_retrieval: verdict.skip_retrieval,
            }),
          };
        }
        Err(e) => tracing::warn!("Query classifier failed, falling back to all projects: {e}"),
      }
    }

    RoutingDecision {
      method: RoutingMethod::All,
      project_ids: ctx.all_projects.iter().map(|p| p.id).collect(),
      confidence: 0.5,
      reason: "no routing signal; searching all projects".to_string(),
      classification: None,
    }
  }
}

/// True when the query names a project other than the focused one, which
/// overrides focus.
fn mentions_other_project(query: &str, focused: &Project, all: &[Project]) -> bool {
  all
    .iter()
    .filter(|p| p.id != focused.id)
    .any(|p| contains_word(query, &p.name))
}

fn heuristic_matches(query: &str, projects: &[Project]) -> Vec<Uuid> {
  projects
    .iter()
    .filter(|project| {
      contains_word(query, &project.name) || project.tags.iter().any(|tag| contains_word(query, tag))
    })
    .map(|p| p.id)
    .collect()
}

/// Case-insensitive whole-word containment; word edges are non-alphanumeric.
fn contains_word(haystack: &str, needle: &str) -> bool {
  if needle.is_empty() {
    return false;
  }
  let haystack = haystack.to_lowercase();
  let needle = needle.to_lowercase();

  let mut search_from = 0;
  while let Some(offset) = haystack[search_from..].find(&needle) {
    let start = search_from + offset;
    let end = start + needle.len();
    let left_ok = start == 0
      || haystack[..start]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_alphanumeric());
    let right_ok = end == haystack.len() || haystack[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
    if left_ok && right_ok {
      return true;
    }
    search_from = start + 1;
  }
  false
}
