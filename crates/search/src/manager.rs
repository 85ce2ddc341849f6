//! Process-wide index managers: one lazily-built index per project, with
//! single-flight construction and explicit invalidation.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::lexical::LexicalStore;
use crate::vector::VectorStore;
use ctx_core::Result;

/// Sharded map of `project_id -> OnceCell<index>`. Concurrent callers for the
/// same project join the same build; the first completion publishes.
pub struct IndexManager<T> {
  cells: DashMap<Uuid, Arc<OnceCell<Arc<T>>>>,
}

impl<T> Default for IndexManager<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> IndexManager<T> {
  pub fn new() -> Self {
    Self { cells: DashMap::new() }
  }

  /// Get the cached index or run `build` exactly once to create it.
  pub async fn get_or_build<F, Fut>(&self, project_id: Uuid, build: F) -> Result<Arc<T>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<T>>>,
  {
    let cell = self
      .cells
      .entry(project_id)
      .or_insert_with(|| Arc::new(OnceCell::new()))
      .clone();
    cell.get_or_try_init(build).await.cloned()
  }

  /// Drop the cached index; the next query rebuilds from the store.
  pub fn invalidate(&self, project_id: Uuid) {
    self.cells.remove(&project_id);
  }

  /// Cache-hit probe: true only if a build has completed and not been
  /// invalidated since.
  pub fn is_cached(&self, project_id: Uuid) -> bool {
    self
      .cells
      .get(&project_id)
      .is_some_and(|cell| cell.initialized())
  }
}

static VECTOR_MANAGER: OnceLock<IndexManager<VectorStore>> = OnceLock::new();
static LEXICAL_MANAGER: OnceLock<IndexManager<LexicalStore>> = OnceLock::new();

pub fn vector_manager() -> &'static IndexManager<VectorStore> {
  VECTOR_MANAGER.get_or_init(IndexManager::new)
}

pub fn lexical_manager() -> &'static IndexManager<LexicalStore> {
  LEXICAL_MANAGER.get_or_init(IndexManager::new)
}

/// Invalidate both per-project caches; used on re-index and remove.
pub fn invalidate_project(project_id: Uuid) {
  vector_manager().invalidate(project_id);
  lexical_manager().invalidate(project_id);
}
