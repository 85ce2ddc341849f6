//! End-to-end: index a real temp tree through the pipeline, then run hybrid
//! retrieval over the stored chunks.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use ctx_core::Language;
use db::Store;
use embedding::{EmbedError, Embedder};
use index::{IndexOptions, IndexingPipeline};
use search::{FilterValue, SearchCoordinator, SearchOptions, invalidate_project, lexical_manager, vector_manager};
use tempfile::TempDir;

const KEYWORDS: [&str; 8] = [
  "jwt", "auth", "token", "middleware", "database", "schema", "install", "guide",
];

/// Deterministic keyword-bag embedder shared by indexing and querying.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
  fn provider_id(&self) -> &str {
    "test"
  }
  fn model_id(&self) -> &str {
    "keyword-bag"
  }
  fn dimensions(&self) -> usize {
    KEYWORDS.len()
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    Ok(
      texts
        .iter()
        .map(|text| {
          let lower = text.to_lowercase();
          KEYWORDS.iter().map(|kw| lower.matches(kw).count() as f32).collect()
        })
        .collect(),
    )
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    Ok(())
  }
}

fn write_sample_tree(root: &Path) {
  std::fs::write(
    root.join("middleware.ts"),
    "export function jwtMiddleware(token: string) {\n  return verifyAuthToken(token);\n}\n",
  )
  .unwrap();
  std::fs::write(
    root.join("schema.ts"),
    "export function databaseSchema() {\n  return buildSchema(tables);\n}\n",
  )
  .unwrap();
  std::fs::write(
    root.join("README.md"),
    "# Guide\n\nInstall the package and wire the auth middleware into the server.\n",
  )
  .unwrap();
}

async fn index_tree(store: Arc<Store>, tree: &Path, locks: &Path, name: &str) -> ctx_core::Project {
  let pipeline = IndexingPipeline::new(store, Arc::new(KeywordEmbedder), locks.to_path_buf());
  let mut opts = IndexOptions::new(tree);
  opts.name = Some(name.to_string());
  let report = pipeline
    .index_project(opts, &|_| {}, &CancellationToken::new())
    .await
    .unwrap();
  report.project
}

#[tokio::test]
async fn test_index_then_hybrid_search() {
  let tree = TempDir::new().unwrap();
  let locks = TempDir::new().unwrap();
  write_sample_tree(tree.path());

  let store = Arc::new(Store::open_in_memory().unwrap());
  let project = index_tree(store.clone(), tree.path(), locks.path(), "e2e-hybrid").await;
  assert!(project.chunk_count >= 3);

  let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
  let response = coordinator
    .search("jwt token middleware", &[project.id], &SearchOptions::default())
    .await
    .unwrap();

  assert!(!response.hits.is_empty());
  assert_eq!(response.hits[0].file_path, "middleware.ts");
  assert!(response.warnings.is_empty());
}

#[tokio::test]
async fn test_language_filter_end_to_end() {
  let tree = TempDir::new().unwrap();
  let locks = TempDir::new().unwrap();
  write_sample_tree(tree.path());

  let store = Arc::new(Store::open_in_memory().unwrap());
  let project = index_tree(store.clone(), tree.path(), locks.path(), "e2e-filter").await;

  let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
  let mut opts = SearchOptions::default();
  opts.filter.language = Some(FilterValue::Eq("markdown".to_string()));
  let response = coordinator
    .search("install guide", &[project.id], &opts)
    .await
    .unwrap();

  assert!(!response.hits.is_empty());
  for hit in &response.hits {
    assert_eq!(hit.language, Some(Language::Markdown));
  }
}

#[tokio::test]
async fn test_force_reindex_invalidates_caches() {
  let tree = TempDir::new().unwrap();
  let locks = TempDir::new().unwrap();
  write_sample_tree(tree.path());

  let store = Arc::new(Store::open_in_memory().unwrap());
  let project = index_tree(store.clone(), tree.path(), locks.path(), "e2e-invalidate").await;

  let coordinator = SearchCoordinator::new(store.clone(), Arc::new(KeywordEmbedder));
  coordinator
    .search("jwt", &[project.id], &SearchOptions::default())
    .await
    .unwrap();
  assert!(vector_manager().is_cached(project.id));

  // Re-index with force and invalidate, as the CLI does.
  std::fs::write(
    tree.path().join("extra.ts"),
    "export function refreshAuthToken() { return rotate(); }\n",
  )
  .unwrap();
  let pipeline = IndexingPipeline::new(store.clone(), Arc::new(KeywordEmbedder), locks.path().to_path_buf());
  let mut opts = IndexOptions::new(tree.path());
  opts.name = Some("e2e-invalidate".to_string());
  opts.force = true;
  pipeline
    .index_project(opts, &|_| {}, &CancellationToken::new())
    .await
    .unwrap();
  invalidate_project(project.id);

  assert!(!vector_manager().is_cached(project.id));
  assert!(!lexical_manager().is_cached(project.id));

  // The next query rebuilds and sees the new chunk.
  let response = coordinator
    .search("refresh auth token", &[project.id], &SearchOptions::default())
    .await
    .unwrap();
  assert!(response.hits.iter().any(|h| h.file_path == "extra.ts"));
}
