//! `ctx status` - storage statistics.

use crate::app::App;
use crate::output;
use ctx_core::{ProvidersFile, Result};

pub fn cmd_status(json: bool) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let stats = store.stats()?;
  let providers = ProvidersFile::load(&app.base_dir)?;

  if json {
    output::print_json(&serde_json::json!({
      "baseDir": app.base_dir,
      "projects": stats.project_count,
      "chunks": stats.chunk_count,
      "evalRuns": stats.eval_run_count,
      "sizeOnDisk": stats.size_on_disk,
      "llmProviders": providers.providers.keys().collect::<Vec<_>>(),
    }));
    return Ok(());
  }

  println!("Store: {}", app.base_dir.join("data").join("context.db").display());
  println!("  Projects:  {}", stats.project_count);
  println!("  Chunks:    {}", stats.chunk_count);
  println!("  Eval runs: {}", stats.eval_run_count);
  println!("  Size:      {}", human_bytes(stats.size_on_disk));
  if providers.providers.is_empty() {
    println!("  LLM providers: none configured");
  } else {
    println!(
      "  LLM providers: {}",
      providers.providers.keys().cloned().collect::<Vec<_>>().join(", ")
    );
  }
  Ok(())
}

fn human_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  if unit == 0 {
    format!("{bytes} B")
  } else {
    format!("{value:.1} {}", UNITS[unit])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_human_bytes() {
    assert_eq!(human_bytes(512), "512 B");
    assert_eq!(human_bytes(2048), "2.0 KB");
    assert_eq!(human_bytes(5 * 1024 * 1024), "5.0 MB");
  }
}
