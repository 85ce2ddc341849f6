//! `ctx list` - tabular project listing.

use crate::app::App;
use crate::output;
use ctx_core::Result;

pub fn cmd_list(json: bool) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let projects = store.list_projects()?;

  if json {
    output::print_json(&projects);
    return Ok(());
  }

  if projects.is_empty() {
    println!("No projects indexed yet. Run 'ctx index <path>' to get started.");
    return Ok(());
  }

  println!(
    "{:<20} {:<8} {:<8} {:<24} {:<20}",
    "NAME", "FILES", "CHUNKS", "MODEL", "UPDATED"
  );
  for project in &projects {
    println!(
      "{:<20} {:<8} {:<8} {:<24} {:<20}",
      project.name,
      project.file_count,
      project.chunk_count,
      project.embedding_model,
      project.updated_at.format("%Y-%m-%d %H:%M"),
    );
  }
  Ok(())
}
