//! Eval harness: drive the retrieval pipeline over a golden dataset, persist
//! the run, and compare with the previous one.

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::dataset::{GoldenDataset, GoldenEntry};
use crate::metrics::{AggregateMetrics, QueryMetrics};
use ctx_core::{Error, EvalError, Project, Result};
use db::{EvalResultRecord, EvalRunRecord, Store};
use search::{SearchCoordinator, SearchOptions};

#[derive(Debug, Clone)]
pub struct EvalOptions {
  /// topK per query.
  pub k: usize,
  /// Keep only entries matching any of these tags; empty keeps all.
  pub tags: Vec<String>,
}

impl Default for EvalOptions {
  fn default() -> Self {
    Self { k: 5, tags: Vec::new() }
  }
}

#[derive(Debug, Clone)]
pub struct RunComparison {
  pub previous_run_id: Uuid,
  pub deltas: Vec<(&'static str, f64)>,
}

#[derive(Debug)]
pub struct EvalRunSummary {
  pub run_id: Uuid,
  pub query_count: usize,
  pub passed: usize,
  pub failed: usize,
  pub skipped: usize,
  pub aggregate: AggregateMetrics,
  pub comparison: Option<RunComparison>,
  pub duration_ms: u64,
}

pub struct EvalHarness {
  store: Arc<Store>,
  coordinator: SearchCoordinator,
}

impl EvalHarness {
  pub fn new(store: Arc<Store>, coordinator: SearchCoordinator) -> Self {
    Self { store, coordinator }
  }

  /// Run the dataset against one project through the full retrieval pipeline.
  pub async fn run(&self, project: &Project, dataset: &GoldenDataset, opts: &EvalOptions) -> Result<EvalRunSummary> {
    dataset.validate()?;
    if opts.k == 0 {
      return Err(Error::Validation("eval k must be >= 1".to_string()));
    }
    let started = Instant::now();

    let entries = dataset.filter_by_tags(&opts.tags);
    if entries.is_empty() {
      return Err(Error::Eval(EvalError::DatasetInvalid(
        "tag filter removed every entry".to_string(),
      )));
    }

    let run = EvalRunRecord::new(
      project.id,
      &dataset.version,
      serde_json::json!({ "k": opts.k, "tags": opts.tags }),
    );
    self.store.insert_eval_run(&run)?;

    match self.execute(project, &entries, opts, run.id).await {
      Ok(mut summary) => {
        summary.duration_ms = started.elapsed().as_millis() as u64;
        Ok(summary)
      }
      Err(e) => {
        // Leave a failed marker behind before surfacing the error.
        let _ = self.store.update_eval_run(
          run.id,
          0,
          &serde_json::json!({}),
          &format!("status:failed error:{e}"),
        );
        Err(Error::Eval(EvalError::RunFailed(e.to_string())))
      }
    }
  }

  async fn execute(
    &self,
    project: &Project,
    entries: &[&GoldenEntry],
    opts: &EvalOptions,
    run_id: Uuid,
  ) -> Result<EvalRunSummary> {
    let search_opts = SearchOptions {
      top_k: opts.k,
      ..Default::default()
    };

    let mut results: Vec<EvalResultRecord> = Vec::new();
    let mut per_query: Vec<QueryMetrics> = Vec::new();
    let mut passed = 0usize;
    let mut skipped = 0usize;

    for entry in entries {
      if entry.expected_file_paths.is_empty() {
        skipped += 1;
        continue;
      }

      let query_started = Instant::now();
      let response = self.coordinator.search(&entry.query, &[project.id], &search_opts).await?;
      let latency_ms = query_started.elapsed().as_millis() as u64;

      let retrieved = ranked_file_paths(&response.hits.iter().map(|h| h.file_path.clone()).collect::<Vec<_>>());
      let metrics = QueryMetrics::compute(&retrieved, &entry.expected_file_paths, opts.k);
      let query_passed = metrics.hit_rate >= 1.0;
      if query_passed {
        passed += 1;
      }

      results.push(EvalResultRecord {
        id: Uuid::new_v4(),
        eval_run_id: run_id,
        query: entry.query.clone(),
        expected_files: entry.expected_file_paths.clone(),
        retrieved_files: retrieved,
        latency_ms,
        metrics: metrics.to_json(),
        passed: query_passed,
      });
      per_query.push(metrics);
    }

    let aggregate = AggregateMetrics::from_queries(&per_query);
    let failed = per_query.len() - passed;

    self.store.insert_eval_results(&results)?;
    self.store.update_eval_run(
      run_id,
      per_query.len() as u32,
      &aggregate.to_json(),
      &format!("status:completed passed:{passed} failed:{failed} skipped:{skipped}"),
    )?;

    let comparison = self
      .store
      .latest_completed_run(project.id, Some(run_id))?
      .and_then(|previous| {
        serde_json::from_value::<AggregateMetrics>(previous.aggregate_metrics.clone())
          .ok()
          .map(|previous_aggregate| RunComparison {
            previous_run_id: previous.id,
            deltas: aggregate.deltas(&previous_aggregate),
          })
      });

    Ok(EvalRunSummary {
      run_id,
      query_count: per_query.len(),
      passed,
      failed,
      skipped,
      aggregate,
      comparison,
      duration_ms: 0,
    })
  }
}

/// Deduplicate ranked file paths preserving first occurrence.
fn ranked_file_paths(paths: &[String]) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  paths.iter().filter(|path| seen.insert(path.as_str())).cloned().collect()
}
