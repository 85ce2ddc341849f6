use async_trait::async_trait;
use tracing::warn;

use crate::provider::{EmbedError, Embedder};

const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";
const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
const DEFAULT_DIMENSIONS: usize = 384;

/// Hugging Face Inference API feature-extraction provider.
#[derive(Debug, Clone)]
pub struct HuggingFaceEmbedder {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimensions: usize,
}

impl HuggingFaceEmbedder {
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

  fn pipeline_url(&self) -> String {
    format!(
      "{}/pipeline/feature-extraction/{}",
      self.base_url.trim_end_matches('/'),
      self.model
    )
  }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
  fn provider_id(&self) -> &str {
    "huggingface"
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

    let body = serde_json::json!({ "inputs": texts, "options": { "wait_for_model": true } });
    let response = self
      .client
      .post(self.pipeline_url())
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await
      .map_err(|e| EmbedError::transport("huggingface", e))?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("HuggingFace embedding failed: {status} - {body}");
      return Err(EmbedError::http(status, body));
    }

    let vectors: Vec<Vec<f32>> = response
      .json()
      .await
      .map_err(|e| EmbedError::transport("huggingface", e))?;
    if vectors.len() != texts.len() {
      return Err(EmbedError::Malformed(format!(
        "expected {} embeddings, got {}",
        texts.len(),
        vectors.len()
      )));
    }
    for vector in &vectors {
      if vector.len() != self.dimensions {
        return Err(EmbedError::DimensionMismatch {
          expected: self.dimensions,
          actual: vector.len(),
        });
      }
    }
    Ok(vectors)
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    if self.api_key.is_empty() {
      return Err(EmbedError::Unreachable {
        provider: "huggingface".to_string(),
        detail: "no API key configured".to_string(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pipeline_url() {
    let provider = HuggingFaceEmbedder::new("hf_test");
    assert_eq!(
      provider.pipeline_url(),
      "https://api-inference.huggingface.co/pipeline/feature-extraction/sentence-transformers/all-MiniLM-L6-v2"
    );
  }

  #[test]
  fn test_defaults() {
    let provider = HuggingFaceEmbedder::new("hf_test");
    assert_eq!(provider.provider_id(), "huggingface");
    assert_eq!(provider.dimensions(), DEFAULT_DIMENSIONS);
  }
}
