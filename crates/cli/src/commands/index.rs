//! `ctx index` - run the full indexing pipeline for one source tree.

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::app::App;
use crate::output;
use ctx_core::Result;
use index::{IndexOptions, IndexingPipeline, PipelineEvent};
use search::invalidate_project;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_index(
  path: PathBuf,
  name: Option<String>,
  tags: Vec<String>,
  description: Option<String>,
  ignore: Vec<String>,
  force: bool,
  json: bool,
) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let embedder = app.embedder().await?;

  let pipeline = IndexingPipeline::new(store, embedder, app.locks_dir())
    .with_batch_size(app.config.embedding.batch_size);

  let mut opts = IndexOptions::new(path);
  opts.name = name;
  opts.tags = tags;
  opts.description = description;
  opts.extra_ignore = ignore;
  opts.force = force;

  // Ctrl-C cancels cooperatively; in-flight batches finish, nothing partial
  // is committed.
  let cancel = CancellationToken::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("Cancelling...");
        cancel.cancel();
      }
    });
  }

  let on_event = move |event: PipelineEvent| {
    if json {
      return;
    }
    match event {
      PipelineEvent::StageStarted { stage } => eprintln!("{}...", capitalize(stage.as_str())),
      PipelineEvent::Progress { stage, done, total } => {
        if total > 0 {
          eprintln!("  {} {done}/{total}", stage.as_str());
        }
      }
      PipelineEvent::Warning { message } => eprintln!("  warning: {message}"),
      PipelineEvent::StageCompleted { .. } => {}
    }
  };

  let report = pipeline.index_project(opts, &on_event, &cancel).await?;

  // A force re-index must never serve stale cached indices.
  if force {
    invalidate_project(report.project.id);
  }

  if json {
    output::print_json(&serde_json::json!({
      "project": report.project.name,
      "projectId": report.project.id,
      "files": report.files_scanned,
      "chunks": report.chunks_embedded,
      "warnings": report.warnings,
      "durationMs": report.duration_ms,
    }));
  } else {
    println!(
      "Indexed '{}': {} files, {} chunks in {}ms",
      report.project.name, report.files_scanned, report.chunks_embedded, report.duration_ms
    );
    output::print_warnings(&report.warnings, json);
  }
  Ok(())
}

fn capitalize(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    None => String::new(),
  }
}
