//! Eval run and per-query result rows.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use crate::store::{Store, storage_err};
use ctx_core::Result;

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvalRunRecord {
  pub id: Uuid,
  pub project_id: Uuid,
  pub timestamp: DateTime<Utc>,
  pub dataset_version: String,
  pub query_count: u32,
  pub aggregate_metrics: serde_json::Value,
  pub config: serde_json::Value,
  /// Encodes status transitions (`status:running` etc.) and counters.
  pub notes: String,
}

impl EvalRunRecord {
  pub fn new(project_id: Uuid, dataset_version: impl Into<String>, config: serde_json::Value) -> Self {
    Self {
      id: Uuid::new_v4(),
      project_id,
      timestamp: Utc::now(),
      dataset_version: dataset_version.into(),
      query_count: 0,
      aggregate_metrics: serde_json::json!({}),
      config,
      notes: "status:running".to_string(),
    }
  }

  pub fn is_completed(&self) -> bool {
    self.notes.contains("status:completed")
  }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EvalResultRecord {
  pub id: Uuid,
  pub eval_run_id: Uuid,
  pub query: String,
  pub expected_files: Vec<String>,
  pub retrieved_files: Vec<String>,
  pub latency_ms: u64,
  pub metrics: serde_json::Value,
  pub passed: bool,
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<EvalRunRecord> {
  let id: String = row.get("id")?;
  let project_id: String = row.get("project_id")?;
  let timestamp: String = row.get("timestamp")?;
  let aggregate_metrics: String = row.get("aggregate_metrics")?;
  let config: String = row.get("config")?;
  Ok(EvalRunRecord {
    id: Uuid::parse_str(&id).unwrap_or_default(),
    project_id: Uuid::parse_str(&project_id).unwrap_or_default(),
    timestamp: DateTime::parse_from_rfc3339(&timestamp)
      .map(|dt| dt.with_timezone(&Utc))
      .unwrap_or_else(|_| Utc::now()),
    dataset_version: row.get("dataset_version")?,
    query_count: row.get::<_, i64>("query_count")? as u32,
    aggregate_metrics: serde_json::from_str(&aggregate_metrics).unwrap_or_else(|_| serde_json::json!({})),
    config: serde_json::from_str(&config).unwrap_or_else(|_| serde_json::json!({})),
    notes: row.get("notes")?,
  })
}

const RUN_COLUMNS: &str = "id, project_id, timestamp, dataset_version, query_count, aggregate_metrics, config, notes";

impl Store {
  pub fn insert_eval_run(&self, run: &EvalRunRecord) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT INTO eval_runs (id, project_id, timestamp, dataset_version, query_count,
           aggregate_metrics, config, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
          run.id.to_string(),
          run.project_id.to_string(),
          run.timestamp.to_rfc3339(),
          run.dataset_version,
          run.query_count as i64,
          run.aggregate_metrics.to_string(),
          run.config.to_string(),
          run.notes,
        ],
      )
      .map_err(storage_err)?;
    Ok(())
  }

  pub fn update_eval_run(
    &self,
    run_id: Uuid,
    query_count: u32,
    aggregate_metrics: &serde_json::Value,
    notes: &str,
  ) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "UPDATE eval_runs SET query_count = ?2, aggregate_metrics = ?3, notes = ?4 WHERE id = ?1",
        params![
          run_id.to_string(),
          query_count as i64,
          aggregate_metrics.to_string(),
          notes
        ],
      )
      .map_err(storage_err)?;
    Ok(())
  }

  /// Bulk insert, one transaction.
  pub fn insert_eval_results(&self, results: &[EvalResultRecord]) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction().map_err(storage_err)?;
    {
      let mut stmt = tx
        .prepare_cached(
          "INSERT INTO eval_results (id, eval_run_id, query, expected_files, retrieved_files,
             latency_ms, metrics, passed)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .map_err(storage_err)?;
      for result in results {
        stmt
          .execute(params![
            result.id.to_string(),
            result.eval_run_id.to_string(),
            result.query,
            serde_json::to_string(&result.expected_files).unwrap_or_else(|_| "[]".to_string()),
            serde_json::to_string(&result.retrieved_files).unwrap_or_else(|_| "[]".to_string()),
            result.latency_ms as i64,
            result.metrics.to_string(),
            result.passed as i64,
          ])
          .map_err(storage_err)?;
      }
    }
    tx.commit().map_err(storage_err)
  }

  /// Runs for a project, newest first.
  pub fn list_eval_runs(&self, project_id: Uuid) -> Result<Vec<EvalRunRecord>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM eval_runs WHERE project_id = ?1 ORDER BY timestamp DESC"
      ))
      .map_err(storage_err)?;
    let rows = stmt
      .query_map(params![project_id.to_string()], run_from_row)
      .map_err(storage_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
  }

  /// Per-query rows for one run, in insertion order.
  pub fn list_eval_results(&self, run_id: Uuid) -> Result<Vec<EvalResultRecord>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, eval_run_id, query, expected_files, retrieved_files, latency_ms, metrics, passed
         FROM eval_results WHERE eval_run_id = ?1 ORDER BY rowid",
      )
      .map_err(storage_err)?;
    let rows = stmt
      .query_map(params![run_id.to_string()], |row| {
        let id: String = row.get("id")?;
        let eval_run_id: String = row.get("eval_run_id")?;
        let expected: String = row.get("expected_files")?;
        let retrieved: String = row.get("retrieved_files")?;
        let metrics: String = row.get("metrics")?;
        Ok(EvalResultRecord {
          id: Uuid::parse_str(&id).unwrap_or_default(),
          eval_run_id: Uuid::parse_str(&eval_run_id).unwrap_or_default(),
          query: row.get("query")?,
          expected_files: serde_json::from_str(&expected).unwrap_or_default(),
          retrieved_files: serde_json::from_str(&retrieved).unwrap_or_default(),
          latency_ms: row.get::<_, i64>("latency_ms")? as u64,
          metrics: serde_json::from_str(&metrics).unwrap_or_else(|_| serde_json::json!({})),
          passed: row.get::<_, i64>("passed")? != 0,
        })
      })
      .map_err(storage_err)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)
  }

  /// Most recent completed run other than `exclude`, for run-to-run comparison.
  pub fn latest_completed_run(&self, project_id: Uuid, exclude: Option<Uuid>) -> Result<Option<EvalRunRecord>> {
    let conn = self.conn()?;
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    conn
      .query_row(
        &format!(
          "SELECT {RUN_COLUMNS} FROM eval_runs
           WHERE project_id = ?1 AND id != ?2 AND notes LIKE '%status:completed%'
           ORDER BY timestamp DESC LIMIT 1"
        ),
        params![project_id.to_string(), exclude],
        run_from_row,
      )
      .optional()
      .map_err(storage_err)
  }
}
