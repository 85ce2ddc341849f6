use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{EmbedError, Embedder};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSIONS: usize = 768;

/// Max concurrent single-embed requests; Ollama has no native batch endpoint.
const BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimensions: usize,
}

impl Default for OllamaEmbedder {
  fn default() -> Self {
    Self::new()
  }
}

impl OllamaEmbedder {
  pub fn new() -> Self {
    let base_url = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
    Self {
      client: reqwest::Client::new(),
      base_url,
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  fn embeddings_url(&self) -> String {
    format!("{}/api/embeddings", self.base_url)
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

impl OllamaEmbedder {
  async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let request = EmbeddingRequest {
      model: &self.model,
      prompt: text,
    };

    debug!("Embedding {} chars with Ollama", text.len());
    let response = self
      .client
      .post(self.embeddings_url())
      .json(&request)
      .send()
      .await
      .map_err(|e| EmbedError::transport("ollama", e))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("Ollama embedding failed: {status} - {body}");
      return Err(EmbedError::http(status, body));
    }

    let result: EmbeddingResponse = response
      .json()
      .await
      .map_err(|e| EmbedError::transport("ollama", e))?;
    if result.embedding.len() != self.dimensions {
      return Err(EmbedError::DimensionMismatch {
        expected: self.dimensions,
        actual: result.embedding.len(),
      });
    }
    Ok(result.embedding)
  }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
  fn provider_id(&self) -> &str {
    "ollama"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    use std::sync::Arc;
    use tokio::sync::Semaphore;

    let semaphore = Arc::new(Semaphore::new(BATCH_CONCURRENCY));
    let futures: Vec<_> = texts
      .iter()
      .map(|text| {
        let permit = semaphore.clone();
        let text = text.to_string();
        let provider = self.clone();
        async move {
          let _permit = permit
            .acquire()
            .await
            .map_err(|_| EmbedError::Malformed("batch semaphore closed".to_string()))?;
          provider.embed_one(&text).await
        }
      })
      .collect();

    let results: Vec<Result<Vec<f32>, EmbedError>> = futures::future::join_all(futures).await;
    results.into_iter().collect()
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    let response = self
      .client
      .get(&self.base_url)
      .timeout(std::time::Duration::from_secs(5))
      .send()
      .await
      .map_err(|e| EmbedError::transport("ollama", e))?;
    if response.status().is_success() {
      Ok(())
    } else {
      Err(EmbedError::http(response.status(), "health probe failed"))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let provider = OllamaEmbedder::new().with_url(DEFAULT_OLLAMA_URL);
    assert_eq!(provider.provider_id(), "ollama");
    assert_eq!(provider.model_id(), DEFAULT_MODEL);
    assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
    assert_eq!(provider.embeddings_url(), "http://localhost:11434/api/embeddings");
  }

  #[test]
  fn test_customization() {
    let provider = OllamaEmbedder::new()
      .with_url("http://custom:8080")
      .with_model("qwen3-embedding", 4096);
    assert_eq!(provider.model_id(), "qwen3-embedding");
    assert_eq!(provider.dimensions(), 4096);
    assert_eq!(provider.embeddings_url(), "http://custom:8080/api/embeddings");
  }
}
