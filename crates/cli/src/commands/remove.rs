//! `ctx remove` - cascade-delete a project.

use std::io::Write;

use crate::app::App;
use ctx_core::Result;
use search::invalidate_project;

pub fn cmd_remove(name: &str, force: bool) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let project = app.resolve_project(&store, name)?;

  if !force {
    print!(
      "Remove '{}' ({} chunks)? This cannot be undone. [y/N] ",
      project.name, project.chunk_count
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
      println!("Aborted.");
      return Ok(());
    }
  }

  store.remove_project(project.id)?;
  invalidate_project(project.id);
  println!("Removed '{}'.", project.name);
  Ok(())
}
