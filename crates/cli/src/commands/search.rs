//! `ctx search` - hybrid retrieval without the LLM step.

use crate::app::App;
use crate::output;
use ctx_core::{Error, Result};
use search::{FilterValue, SearchOptions};

pub async fn cmd_search(
  query: &str,
  project: Option<&str>,
  file_type: Option<&str>,
  language: Option<&str>,
  top_k: Option<usize>,
  min_score: Option<f32>,
  json: bool,
) -> Result<()> {
  if query.trim().is_empty() {
    return Err(Error::Validation("query must not be empty".to_string()));
  }

  let app = App::load()?;
  let store = app.open_store()?;

  let project_ids = match project {
    Some(name) => vec![app.resolve_project(&store, name)?.id],
    None => store.list_projects()?.iter().map(|p| p.id).collect(),
  };

  let mut opts = SearchOptions {
    top_k: top_k.unwrap_or(app.config.search.top_k),
    rerank: app.config.search.rerank,
    ..Default::default()
  };
  if let Some(file_type) = file_type {
    opts.filter.file_type = Some(FilterValue::Eq(file_type.to_string()));
  }
  if let Some(language) = language {
    opts.filter.language = Some(FilterValue::Eq(language.to_string()));
  }
  opts.filter.min_score = min_score;

  let embedder = app.embedder().await?;
  let coordinator = app.coordinator(store, embedder);
  let response = coordinator.search(query, &project_ids, &opts).await?;

  if json {
    output::print_json(&serde_json::json!({
      "query": query,
      "hits": response.hits,
      "warnings": response.warnings,
      "searchTimeMs": response.search_time_ms,
    }));
    return Ok(());
  }

  output::print_warnings(&response.warnings, json);
  if response.hits.is_empty() {
    println!("No results for: {query}");
    return Ok(());
  }

  println!("Found {} results in {}ms:\n", response.hits.len(), response.search_time_ms);
  for (i, hit) in response.hits.iter().enumerate() {
    println!(
      "{}. [{}] {}:{}-{} (score {:.2})",
      i + 1,
      hit.project_name,
      hit.file_path,
      hit.start_line,
      hit.end_line,
      hit.score,
    );
    if let Some(symbol) = &hit.metadata.symbol_name {
      println!("   Symbol: {symbol}");
    }
    let preview: String = hit.content.lines().take(3).collect::<Vec<_>>().join("\n   ");
    println!("   {preview}\n");
  }
  Ok(())
}
