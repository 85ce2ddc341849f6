//! `ctx check` - health-check a project's index.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::App;
use crate::output;
use ctx_core::Result;
use index::{ScanOptions, scan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Severity {
  Error,
  Warn,
}

#[derive(Debug, Serialize)]
struct Finding {
  severity: Severity,
  message: String,
}

pub fn cmd_check(name: &str, json: bool) -> Result<()> {
  let app = App::load()?;
  let store = app.open_store()?;
  let project = app.resolve_project(&store, name)?;

  let mut findings: Vec<Finding> = Vec::new();

  if !project.path.exists() {
    findings.push(Finding {
      severity: Severity::Error,
      message: format!("indexed path {} no longer exists", project.path.display()),
    });
  }

  if project.chunk_count == 0 {
    findings.push(Finding {
      severity: Severity::Error,
      message: "project has no chunks; re-index it".to_string(),
    });
  }

  if project.embedding_model != app.config.embedding.model {
    findings.push(Finding {
      severity: Severity::Warn,
      message: format!(
        "project was indexed with '{}' but the configured model is '{}'",
        project.embedding_model, app.config.embedding.model
      ),
    });
  }

  if project.path.exists() {
    let stale = count_stale_files(&project.path, project.indexed_at);
    if stale > 0 {
      findings.push(Finding {
        severity: Severity::Warn,
        message: format!("{stale} files changed since the last index; consider --force re-indexing"),
      });
    }
  }

  let has_errors = findings.iter().any(|f| f.severity == Severity::Error);

  if json {
    output::print_json(&serde_json::json!({
      "project": project.name,
      "healthy": findings.is_empty(),
      "findings": findings,
    }));
  } else if findings.is_empty() {
    println!("'{}' looks healthy: {} files, {} chunks.", project.name, project.file_count, project.chunk_count);
  } else {
    println!("Health check for '{}':", project.name);
    for finding in &findings {
      let label = match finding.severity {
        Severity::Error => "error",
        Severity::Warn => "warn",
      };
      println!("  [{label}] {}", finding.message);
    }
  }

  if has_errors {
    std::process::exit(1);
  }
  Ok(())
}

/// Files whose mtime is newer than the last indexing run.
fn count_stale_files(root: &std::path::Path, indexed_at: DateTime<Utc>) -> usize {
  let result = scan(root, &ScanOptions::default(), &|_| {}, &|_| {});
  result
    .files
    .iter()
    .filter(|file| {
      DateTime::parse_from_rfc3339(&file.mtime)
        .map(|mtime| mtime.with_timezone(&Utc) > indexed_at)
        .unwrap_or(false)
    })
    .count()
}
