//! Shared command context: configuration, store handle, providers.

use std::path::PathBuf;
use std::sync::Arc;

use ctx_core::{Config, Error, Project, Result, ctx_dir, db_path, tracer_from_config};
use db::Store;
use embedding::{Embedder, build_embedder};
use search::{EmbeddingCrossEncoder, Reranker, SearchCoordinator};

pub struct App {
  pub base_dir: PathBuf,
  pub config: Config,
}

impl App {
  pub fn load() -> Result<Self> {
    let base_dir = ctx_dir();
    let config = Config::load(&base_dir)?;
    Ok(Self { base_dir, config })
  }

  pub fn open_store(&self) -> Result<Arc<Store>> {
    Ok(Arc::new(Store::open(&db_path(&self.base_dir))?))
  }

  pub fn locks_dir(&self) -> PathBuf {
    self.base_dir.join("locks")
  }

  pub fn eval_dataset_path(&self, project_name: &str) -> PathBuf {
    let golden = PathBuf::from(&self.config.eval.golden_path);
    let dir = if golden.is_absolute() { golden } else { self.base_dir.join(golden) };
    dir.join(format!("{project_name}.json"))
  }

  pub async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
    build_embedder(&self.config.embedding).await
  }

  /// Coordinator wired per config: reranking uses the embedding-backed
  /// cross-encoder unless disabled; tracing exports only when keys are set.
  pub fn coordinator(&self, store: Arc<Store>, embedder: Arc<dyn Embedder>) -> SearchCoordinator {
    let coordinator = SearchCoordinator::new(store, embedder.clone())
      .with_tracer(tracer_from_config(&self.config.observability));
    if self.config.search.rerank {
      coordinator.with_reranker(Reranker::new(Arc::new(EmbeddingCrossEncoder::new(embedder)), 50))
    } else {
      coordinator
    }
  }

  /// Resolve `--project` to a project row, failing with not-found.
  pub fn resolve_project(&self, store: &Store, name: &str) -> Result<Project> {
    store.get_project_by_name(name)?.ok_or(Error::NotFound {
      entity: "project",
      id: name.to_string(),
    })
  }
}
