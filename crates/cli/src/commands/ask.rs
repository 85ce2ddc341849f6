//! `ctx ask` - retrieve, assemble, and emit the cited context block that
//! feeds the external agent.

use crate::app::App;
use crate::output;
use ctx_core::{Error, Result};
use search::{QueryContext, QueryRouter, RetrieveKnowledgeInput, ToolResponse, retrieve_knowledge};

pub async fn cmd_ask(question: &str, project: Option<&str>, top_k: Option<usize>, json: bool) -> Result<()> {
  if question.trim().is_empty() {
    return Err(Error::Validation("question must not be empty".to_string()));
  }
  if let Some(top_k) = top_k
    && !(1..=20).contains(&top_k)
  {
    return Err(Error::Validation(format!("--top-k must be in [1, 20], got {top_k}")));
  }

  let app = App::load()?;
  let store = app.open_store()?;

  // Focus is resolved now, at call time.
  let focused = match project {
    Some(name) => Some(app.resolve_project(&store, name)?),
    None => None,
  };
  let ctx = QueryContext {
    focused,
    all_projects: store.list_projects()?,
  };

  let embedder = app.embedder().await?;
  let coordinator = app.coordinator(store, embedder);
  let router = QueryRouter::new();

  let response = retrieve_knowledge(
    &coordinator,
    &router,
    &ctx,
    RetrieveKnowledgeInput {
      query: question.to_string(),
      max_results: top_k,
    },
  )
  .await;

  if json {
    output::print_json(&response);
    return match response {
      ToolResponse::Success(_) => Ok(()),
      ToolResponse::Failure { error } => Err(Error::Provider(error)),
    };
  }

  match response {
    ToolResponse::Failure { error } => Err(Error::Provider(error)),
    ToolResponse::Success(result) => {
      if result.context.is_empty() {
        println!("No relevant context found for: {question}");
        return Ok(());
      }
      println!("{}\n", result.context);
      println!(
        "Routing: {} (confidence {:.2}) - {}",
        result.routing.method.as_str(),
        result.routing.confidence,
        result.routing.reason
      );
      println!("Sources ({}):", result.sources.len());
      for source in &result.sources {
        println!(
          "  [{}] {}:{}-{} ({}, score {:.2})",
          source.index, source.file_path, source.start_line, source.end_line, source.project, source.score
        );
      }
      println!(
        "\n~{} tokens retrieved in {}ms",
        result.estimated_tokens, result.search_time_ms
      );
      Ok(())
    }
  }
}
