//! Multi-project search coordination: resolve targets, ensure per-project
//! indices, fan out dense and lexical retrieval, fuse, rerank.

use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::fusion::{RRF_K, rrf_fuse};
use crate::lexical::{Bm25Params, build_lexical_index};
use crate::manager::{lexical_manager, vector_manager};
use crate::rerank::Reranker;
use crate::types::{Hit, SearchOptions};
use crate::vector::{VectorIndexConfig, build_vector_index};
use ctx_core::{Error, Project, Result, SpanUpdate, Tracer, noop_tracer};
use db::Store;
use embedding::Embedder;

#[derive(Debug)]
pub struct SearchResponse {
  pub hits: Vec<Hit>,
  pub warnings: Vec<String>,
  pub search_time_ms: u64,
}

struct ProjectResults {
  fused: Vec<Hit>,
  warnings: Vec<String>,
  /// Both retrieval paths failed outright (distinct from empty results).
  both_failed: bool,
}

pub struct SearchCoordinator {
  store: Arc<Store>,
  embedder: Arc<dyn Embedder>,
  reranker: Option<Reranker>,
  tracer: Arc<dyn Tracer>,
}

impl SearchCoordinator {
  pub fn new(store: Arc<Store>, embedder: Arc<dyn Embedder>) -> Self {
    Self {
      store,
      embedder,
      reranker: None,
      tracer: noop_tracer(),
    }
  }

  pub fn with_reranker(mut self, reranker: Reranker) -> Self {
    self.reranker = Some(reranker);
    self
  }

  pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
    self.tracer = tracer;
    self
  }

  /// Run one query across the given projects.
  ///
  /// If only one of the dense/lexical paths fails the other's results are
  /// used with a warning; if both fail for every project, the query fails.
  pub async fn search(&self, query: &str, project_ids: &[Uuid], opts: &SearchOptions) -> Result<SearchResponse> {
    opts.validate()?;
    let started = Instant::now();
    let mut warnings = Vec::new();

    if opts.top_k == 0 {
      return Ok(SearchResponse {
        hits: Vec::new(),
        warnings,
        search_time_ms: started.elapsed().as_millis() as u64,
      });
    }

    // Resolve target projects; a missing id is a warning, not a failure.
    let mut projects: Vec<Project> = Vec::new();
    for id in project_ids {
      match self.store.get_project_by_id(*id)? {
        Some(project) => projects.push(project),
        None => warnings.push(format!("project {id} not found")),
      }
    }

    // The query embedding is only valid for projects indexed at the same
    // dimensionality.
    let dims = self.embedder.dimensions();
    let mismatched: Vec<String> = projects
      .iter()
      .filter(|p| p.embedding_dimensions != dims)
      .map(|p| p.name.clone())
      .collect();
    if !mismatched.is_empty() {
      if mismatched.len() == projects.len() && !projects.is_empty() {
        let project = &projects[0];
        return Err(Error::DimensionMismatch {
          expected: project.embedding_dimensions,
          actual: dims,
        });
      }
      for name in &mismatched {
        warnings.push(format!(
          "project '{name}' was indexed with different embedding dimensions; skipping"
        ));
      }
      projects.retain(|p| p.embedding_dimensions == dims);
    }

    if projects.is_empty() {
      return Ok(SearchResponse {
        hits: Vec::new(),
        warnings,
        search_time_ms: started.elapsed().as_millis() as u64,
      });
    }

    let mut trace = self.tracer.trace("search");
    let mut retrieve_span = trace.span("retrieve");

    // One query embedding serves every project's dense search.
    let query_vec = match self.embedder.embed(query).await {
      Ok(vec) => Some(vec),
      Err(e) => {
        warnings.push(format!("dense retrieval unavailable: {e}"));
        None
      }
    };

    let tasks = projects.iter().map(|project| {
      let project = project.clone();
      let store = self.store.clone();
      let query_vec = query_vec.clone();
      async move { self.search_project(&store, &project, query, query_vec.as_deref(), opts).await }
    });
    let per_project: Vec<ProjectResults> = futures::future::join_all(tasks).await;

    let mut lists: Vec<Vec<Hit>> = Vec::with_capacity(per_project.len());
    let mut failed_projects = 0usize;
    for result in per_project {
      warnings.extend(result.warnings);
      if result.both_failed {
        failed_projects += 1;
      } else {
        lists.push(result.fused);
      }
    }
    if failed_projects == projects.len() {
      return Err(Error::Provider(
        "both dense and lexical retrieval failed for every project".to_string(),
      ));
    }

    // Second fusion point: across projects.
    let fused = rrf_fuse(&lists, RRF_K);

    // Re-check structural filters after the merge.
    let mut hits: Vec<Hit> = fused
      .into_iter()
      .filter(|hit| opts.filter.accepts(hit.file_type, hit.language, hit.project_id))
      .collect();

    retrieve_span.update(SpanUpdate {
      output: Some(format!("{} fused candidates", hits.len())),
      ..Default::default()
    });
    retrieve_span.end();

    if opts.rerank && let Some(reranker) = &self.reranker {
      let mut rerank_span = trace.span("rerank");
      match reranker.rerank(query, hits.clone()).await {
        Ok(reranked) => hits = reranked,
        Err(e) => warnings.push(format!("reranking failed, keeping fused order: {e}")),
      }
      rerank_span.end();
    }

    if let Some(min_score) = opts.filter.min_score {
      hits.retain(|hit| hit.score >= min_score);
    }
    hits.truncate(opts.top_k);
    trace.end();

    Ok(SearchResponse {
      hits,
      warnings,
      search_time_ms: started.elapsed().as_millis() as u64,
    })
  }

  /// Dense and lexical retrieval for one project, fused.
  async fn search_project(
    &self,
    store: &Arc<Store>,
    project: &Project,
    query: &str,
    query_vec: Option<&[f32]>,
    opts: &SearchOptions,
  ) -> ProjectResults {
    let mut warnings = Vec::new();

    let dense = match query_vec {
      Some(query_vec) => {
        let build_store = store.clone();
        let build_project = project.clone();
        let index = vector_manager()
          .get_or_build(project.id, || async move {
            build_vector_index(&build_store, &build_project, VectorIndexConfig::default()).map(Arc::new)
          })
          .await;
        match index {
          Ok(index) => match index.search(query_vec, opts.top_k_per_project, &opts.filter) {
            Ok(hits) => Some(hits),
            Err(e) => {
              warnings.push(format!("dense search failed for '{}': {e}", project.name));
              None
            }
          },
          Err(e) => {
            warnings.push(format!("vector index unavailable for '{}': {e}", project.name));
            None
          }
        }
      }
      None => None,
    };

    let lexical = {
      let build_store = store.clone();
      let build_project = project.clone();
      let index = lexical_manager()
        .get_or_build(project.id, || async move {
          build_lexical_index(&build_store, &build_project, Bm25Params::default()).map(Arc::new)
        })
        .await;
      match index {
        Ok(index) => match index.search(query, opts.top_k_per_project, &opts.filter) {
          Ok(hits) => Some(hits),
          Err(e) => {
            warnings.push(format!("lexical search failed for '{}': {e}", project.name));
            None
          }
        },
        Err(e) => {
          warnings.push(format!("lexical index unavailable for '{}': {e}", project.name));
          None
        }
      }
    };

    let both_failed = dense.is_none() && lexical.is_none();

    // First fusion point: dense with lexical, within the project.
    let lists: Vec<Vec<Hit>> = [dense, lexical].into_iter().flatten().collect();
    let mut fused = rrf_fuse(&lists, RRF_K);
    fused.truncate(opts.top_k_per_project);

    ProjectResults {
      fused,
      warnings,
      both_failed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manager::invalidate_project;
  use async_trait::async_trait;
  use chrono::Utc;
  use ctx_core::{Chunk, ChunkMetadata, FileType, Language, chunk_id, content_hash};
  use embedding::EmbedError;
  use std::path::PathBuf;

  const KEYWORDS: [&str; 8] = [
    "jwt", "auth", "token", "database", "schema", "migration", "http", "server",
  ];

  /// Deterministic keyword-bag embedder: dimension i counts KEYWORDS[i].
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

    async fn embed_batch(&self, texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
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

    async fn is_available(&self) -> std::result::Result<(), EmbedError> {
      Ok(())
    }
  }

  struct FailingEmbedder;

  #[async_trait]
  impl Embedder for FailingEmbedder {
    fn provider_id(&self) -> &str {
      "broken"
    }
    fn model_id(&self) -> &str {
      "broken"
    }
    fn dimensions(&self) -> usize {
      KEYWORDS.len()
    }
    async fn embed_batch(&self, _texts: &[&str]) -> std::result::Result<Vec<Vec<f32>>, EmbedError> {
      Err(EmbedError::Unreachable {
        provider: "broken".to_string(),
        detail: "connection refused".to_string(),
      })
    }
    async fn is_available(&self) -> std::result::Result<(), EmbedError> {
      Err(EmbedError::Unreachable {
        provider: "broken".to_string(),
        detail: "connection refused".to_string(),
      })
    }
  }

  async fn embed_one(text: &str) -> Vec<f32> {
    KeywordEmbedder.embed(text).await.unwrap()
  }

  fn make_chunk(project: &Project, path: &str, content: &str, embedding: Vec<f32>) -> Chunk {
    let hash = content_hash(content);
    Chunk {
      id: chunk_id(project.id, path, 1, 5, &hash),
      project_id: project.id,
      file_path: path.to_string(),
      content: content.to_string(),
      embedding,
      file_type: FileType::Code,
      language: Some(Language::TypeScript),
      start_line: 1,
      end_line: 5,
      metadata: ChunkMetadata::default(),
      content_hash: hash,
      indexed_at: Utc::now(),
    }
  }

  async fn seeded_project(store: &Store, name: &str) -> Project {
    let project = Project::new(name, PathBuf::from(format!("/tmp/{name}")), "keyword-bag", KEYWORDS.len());
    store.upsert_project(&project).unwrap();

    let a_content = "export function jwtMiddleware(token: string) { return verifyJwt(token); }";
    let b_content = "export function databaseSchema() { return buildSchema(migrations); }";
    let chunks = vec![
      make_chunk(&project, "src/middleware.ts", a_content, embed_one(a_content).await),
      make_chunk(&project, "src/schema.ts", b_content, embed_one(b_content).await),
    ];
    store.insert_chunks(project.id, &chunks).unwrap();
    project
  }

  #[tokio::test]
  async fn test_hybrid_retrieval_ranks_relevant_first() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = seeded_project(&store, "hybrid-test").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let response = coordinator
      .search("jwt authentication", &[project.id], &SearchOptions::default())
      .await
      .unwrap();

    assert_eq!(response.hits.len(), 2);
    assert_eq!(response.hits[0].file_path, "src/middleware.ts");
    assert!(response.warnings.is_empty());
  }

  #[tokio::test]
  async fn test_empty_project_returns_empty() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = Project::new("empty-project", PathBuf::from("/tmp/empty"), "keyword-bag", KEYWORDS.len());
    store.upsert_project(&project).unwrap();

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let response = coordinator
      .search("anything", &[project.id], &SearchOptions::default())
      .await
      .unwrap();
    assert!(response.hits.is_empty());
  }

  #[tokio::test]
  async fn test_top_k_zero_short_circuits() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = seeded_project(&store, "topk-zero").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let mut opts = SearchOptions::default();
    opts.top_k = 0;
    let response = coordinator.search("jwt", &[project.id], &opts).await.unwrap();
    assert!(response.hits.is_empty());
  }

  #[tokio::test]
  async fn test_dense_failure_degrades_to_lexical() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = seeded_project(&store, "degraded").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(FailingEmbedder));
    let response = coordinator
      .search("jwt middleware", &[project.id], &SearchOptions::default())
      .await
      .unwrap();

    // Lexical still finds the middleware chunk.
    assert!(!response.hits.is_empty());
    assert_eq!(response.hits[0].file_path, "src/middleware.ts");
    assert!(response.warnings.iter().any(|w| w.contains("dense retrieval unavailable")));
  }

  #[tokio::test]
  async fn test_cross_project_fan_out_attributes_origin() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let alpha = seeded_project(&store, "fanout-alpha").await;
    let beta = seeded_project(&store, "fanout-beta").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let mut opts = SearchOptions::default();
    opts.top_k = 10;
    let response = coordinator
      .search("jwt authentication", &[alpha.id, beta.id], &opts)
      .await
      .unwrap();

    let names: std::collections::HashSet<_> = response.hits.iter().map(|h| h.project_name.as_str()).collect();
    assert!(names.contains("fanout-alpha"));
    assert!(names.contains("fanout-beta"));
  }

  #[tokio::test]
  async fn test_unknown_project_warns_and_returns_empty() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));

    let response = coordinator
      .search("query", &[Uuid::new_v4()], &SearchOptions::default())
      .await
      .unwrap();
    assert!(response.hits.is_empty());
    assert_eq!(response.warnings.len(), 1);
  }

  #[tokio::test]
  async fn test_dimension_mismatch_is_fatal() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = Project::new("dims-project", PathBuf::from("/tmp/dims"), "other-model", 32);
    store.upsert_project(&project).unwrap();

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let err = coordinator
      .search("query", &[project.id], &SearchOptions::default())
      .await
      .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
  }

  #[tokio::test]
  async fn test_identical_queries_identical_results() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = seeded_project(&store, "deterministic").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    let first = coordinator
      .search("jwt authentication", &[project.id], &SearchOptions::default())
      .await
      .unwrap();
    let second = coordinator
      .search("jwt authentication", &[project.id], &SearchOptions::default())
      .await
      .unwrap();

    let first_ids: Vec<_> = first.hits.iter().map(|h| h.chunk_id).collect();
    let second_ids: Vec<_> = second.hits.iter().map(|h| h.chunk_id).collect();
    assert_eq!(first_ids, second_ids);
  }

  #[tokio::test]
  async fn test_invalidation_probe_after_force_reindex() {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let project = seeded_project(&store, "invalidate-probe").await;

    let coordinator = SearchCoordinator::new(store, Arc::new(KeywordEmbedder));
    coordinator
      .search("jwt", &[project.id], &SearchOptions::default())
      .await
      .unwrap();
    assert!(vector_manager().is_cached(project.id));
    assert!(lexical_manager().is_cached(project.id));

    // Force re-index invalidates; the probe must miss.
    invalidate_project(project.id);
    assert!(!vector_manager().is_cached(project.id));
    assert!(!lexical_manager().is_cached(project.id));
  }
}
