//! `ctx eval` - run retrieval evals and export results.

use std::path::PathBuf;

use crate::app::App;
use crate::output;
use ctx_core::{Error, EvalError, Result};
use eval::{EvalHarness, EvalOptions, GoldenDataset};

pub async fn cmd_eval_run(
  project_name: &str,
  dataset_path: Option<PathBuf>,
  k: Option<usize>,
  tags: Vec<String>,
  json: bool,
) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let project = app.resolve_project(&store, project_name)?;

  let dataset_path = dataset_path.unwrap_or_else(|| app.eval_dataset_path(&project.name));
  let dataset = GoldenDataset::load(&dataset_path)?;

  let embedder = app.embedder().await?;
  let coordinator = app.coordinator(store.clone(), embedder);
  let harness = EvalHarness::new(store, coordinator);

  let opts = EvalOptions {
    k: k.unwrap_or(app.config.eval.default_k),
    tags,
  };
  let summary = harness.run(&project, &dataset, &opts).await?;

  let thresholds = &app.config.eval.thresholds;
  let below_thresholds = summary.aggregate.mrr < thresholds.mrr
    || summary.aggregate.hit_rate < thresholds.hit_rate
    || summary.aggregate.precision_at_k < thresholds.precision_at_k;

  if json {
    output::print_json(&serde_json::json!({
      "runId": summary.run_id,
      "queries": summary.query_count,
      "passed": summary.passed,
      "failed": summary.failed,
      "skipped": summary.skipped,
      "metrics": summary.aggregate,
      "belowThresholds": below_thresholds,
      "comparison": summary.comparison.as_ref().map(|c| serde_json::json!({
        "previousRunId": c.previous_run_id,
        "deltas": c.deltas.iter().map(|(name, delta)| (name.to_string(), delta)).collect::<std::collections::BTreeMap<_, _>>(),
      })),
      "durationMs": summary.duration_ms,
    }));
    return Ok(());
  }

  println!(
    "Eval run {} for '{}': {} queries, {} passed, {} failed ({}ms)",
    summary.run_id, project.name, summary.query_count, summary.passed, summary.failed, summary.duration_ms
  );
  println!("  MRR:          {:.3}", summary.aggregate.mrr);
  println!("  Precision@k:  {:.3}", summary.aggregate.precision_at_k);
  println!("  Recall@k:     {:.3}", summary.aggregate.recall_at_k);
  println!("  Hit rate:     {:.3}", summary.aggregate.hit_rate);
  println!("  nDCG@k:       {:.3}", summary.aggregate.ndcg_at_k);
  println!("  MAP:          {:.3}", summary.aggregate.map);

  if let Some(comparison) = &summary.comparison {
    println!("\nAgainst previous run {}:", comparison.previous_run_id);
    for (name, delta) in &comparison.deltas {
      let sign = if *delta >= 0.0 { "+" } else { "" };
      println!("  {name:<14} {sign}{delta:.3}");
    }
  }

  if below_thresholds {
    println!("\nBelow configured thresholds (mrr >= {:.2}, hit_rate >= {:.2}, precision_at_k >= {:.2}).",
      thresholds.mrr, thresholds.hit_rate, thresholds.precision_at_k);
  }
  Ok(())
}

pub fn cmd_eval_export(project_name: &str, out: Option<PathBuf>) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let project = app.resolve_project(&store, project_name)?;

  let run = store
    .latest_completed_run(project.id, None)?
    .ok_or_else(|| Error::Eval(EvalError::DatasetNotFound(format!("no completed eval runs for '{}'", project.name))))?;
  let results = store.list_eval_results(run.id)?;

  let document = serde_json::json!({
    "run": run,
    "results": results,
  });
  let rendered = serde_json::to_string_pretty(&document)
    .map_err(|e| Error::Storage(format!("failed to render export: {e}")))?;

  match out {
    Some(path) => {
      std::fs::write(&path, rendered)?;
      println!("Exported run {} to {}", run.id, path.display());
    }
    None => println!("{rendered}"),
  }
  Ok(())
}
