//! Provider construction from typed configuration.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CachedEmbedder;
use crate::huggingface::HuggingFaceEmbedder;
use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAiEmbedder;
use crate::provider::Embedder;
use crate::retry::{RetryPolicy, RetryingEmbedder};
use ctx_core::{EmbeddingConfig, EmbeddingProviderKind, Error, Result};

/// Known model dimensions per provider; unknown models fall back to the
/// provider default and are validated against the project row at index time.
fn model_dimensions(kind: EmbeddingProviderKind, model: &str) -> usize {
  match (kind, model) {
    (EmbeddingProviderKind::Ollama, "nomic-embed-text") => 768,
    (EmbeddingProviderKind::Ollama, "mxbai-embed-large") => 1024,
    (EmbeddingProviderKind::Ollama, "all-minilm") => 384,
    (EmbeddingProviderKind::Ollama, "qwen3-embedding") => 4096,
    (EmbeddingProviderKind::Ollama, _) => 768,
    (EmbeddingProviderKind::Openai, "text-embedding-3-small") => 1536,
    (EmbeddingProviderKind::Openai, "text-embedding-3-large") => 3072,
    (EmbeddingProviderKind::Openai, _) => 1536,
    (EmbeddingProviderKind::Huggingface, m) if m.contains("MiniLM") => 384,
    (EmbeddingProviderKind::Huggingface, m) if m.contains("mpnet") => 768,
    (EmbeddingProviderKind::Huggingface, _) => 384,
  }
}

fn instantiate(kind: EmbeddingProviderKind, model: &str) -> Arc<dyn Embedder> {
  let dims = model_dimensions(kind, model);
  match kind {
    EmbeddingProviderKind::Ollama => Arc::new(RetryingEmbedder::with_policy(
      OllamaEmbedder::new().with_model(model, dims),
      RetryPolicy::local(),
    )),
    EmbeddingProviderKind::Openai => {
      let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
      Arc::new(RetryingEmbedder::with_policy(
        OpenAiEmbedder::new(api_key).with_model(model, dims),
        RetryPolicy::remote(),
      ))
    }
    EmbeddingProviderKind::Huggingface => {
      let api_key = std::env::var("HF_API_KEY").unwrap_or_default();
      Arc::new(RetryingEmbedder::with_policy(
        HuggingFaceEmbedder::new(api_key).with_model(model, dims),
        RetryPolicy::remote(),
      ))
    }
  }
}

/// Build the configured embedder, wrapped in the dedup cache.
///
/// If the primary is unavailable and a fallback is declared, the fallback is
/// used only when its dimensions match the primary's; otherwise this is a
/// hard error, because mixing dimensions would corrupt the project contract.
pub async fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
  let primary = instantiate(config.provider, &config.model);

  match primary.is_available().await {
    Ok(()) => {
      info!(
        "Using embedding provider {} ({}, {} dims)",
        primary.provider_id(),
        primary.model_id(),
        primary.dimensions()
      );
      return Ok(Arc::new(CachedEmbedder::new(primary)));
    }
    Err(e) => warn!("Primary embedding provider unavailable: {e}"),
  }

  let (Some(fallback_kind), Some(fallback_model)) = (config.fallback_provider, config.fallback_model.as_ref()) else {
    return Err(Error::Provider(format!(
      "embedding provider '{}' is unavailable and no fallback is configured",
      config.provider.as_str()
    )));
  };

  let fallback = instantiate(fallback_kind, fallback_model);
  if fallback.dimensions() != primary.dimensions() {
    return Err(Error::DimensionMismatch {
      expected: primary.dimensions(),
      actual: fallback.dimensions(),
    });
  }

  fallback.is_available().await.map_err(|e| {
    Error::Provider(format!(
      "both primary and fallback embedding providers are unavailable: {e}"
    ))
  })?;

  info!(
    "Falling back to embedding provider {} ({})",
    fallback.provider_id(),
    fallback.model_id()
  );
  Ok(Arc::new(CachedEmbedder::new(fallback)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_known_model_dimensions() {
    assert_eq!(model_dimensions(EmbeddingProviderKind::Ollama, "nomic-embed-text"), 768);
    assert_eq!(
      model_dimensions(EmbeddingProviderKind::Openai, "text-embedding-3-large"),
      3072
    );
    assert_eq!(
      model_dimensions(
        EmbeddingProviderKind::Huggingface,
        "sentence-transformers/all-MiniLM-L6-v2"
      ),
      384
    );
  }

  #[test]
  fn test_instantiate_matches_config() {
    let provider = instantiate(EmbeddingProviderKind::Ollama, "nomic-embed-text");
    assert_eq!(provider.provider_id(), "ollama");
    assert_eq!(provider.dimensions(), 768);
  }
}
