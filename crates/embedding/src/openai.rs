use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::provider::{EmbedError, Embedder};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSIONS: usize = 1536;

/// OpenAI-compatible `/v1/embeddings` provider. Works against OpenAI itself
/// or any server speaking the same protocol.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimensions: usize,
}

impl OpenAiEmbedder {
  pub fn new(api_key: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_BASE_URL.to_string(),
      api_key: api_key.into(),
      model: DEFAULT_MODEL.to_string(),
      dimensions: DEFAULT_DIMENSIONS,
    }
  }

  pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
    self.model = model.into();
    self.dimensions = dimensions;
    self
  }

  fn embeddings_url(&self) -> String {
    format!("{}/embeddings", self.base_url.trim_end_matches('/'))
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
  data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
  index: usize,
  embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
  fn provider_id(&self) -> &str {
    "openai"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let request = EmbeddingsRequest {
      model: &self.model,
      input: texts,
    };
    let response = self
      .client
      .post(self.embeddings_url())
      .bearer_auth(&self.api_key)
      .json(&request)
      .send()
      .await
      .map_err(|e| EmbedError::transport("openai", e))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("Embeddings request failed: {status} - {body}");
      return Err(EmbedError::http(status, body));
    }

    let mut result: EmbeddingsResponse = response
      .json()
      .await
      .map_err(|e| EmbedError::transport("openai", e))?;
    if result.data.len() != texts.len() {
      return Err(EmbedError::Malformed(format!(
        "expected {} embeddings, got {}",
        texts.len(),
        result.data.len()
      )));
    }

    // The protocol does not guarantee order; indices do.
    result.data.sort_by_key(|item| item.index);
    let mut vectors = Vec::with_capacity(result.data.len());
    for item in result.data {
      if item.embedding.len() != self.dimensions {
        return Err(EmbedError::DimensionMismatch {
          expected: self.dimensions,
          actual: item.embedding.len(),
        });
      }
      vectors.push(item.embedding);
    }
    Ok(vectors)
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    if self.api_key.is_empty() {
      return Err(EmbedError::Unreachable {
        provider: "openai".to_string(),
        detail: "no API key configured".to_string(),
      });
    }
    Ok(())
  }
}
