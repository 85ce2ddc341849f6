//! Deduplicating embedding cache.
//!
//! Identical inputs inside one batch hit the provider once; repeats across
//! calls within a run come from the cache. Keyed by (provider, model, text).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::provider::{EmbedError, Embedder};

pub struct CachedEmbedder {
  inner: Arc<dyn Embedder>,
  cache: Mutex<HashMap<String, Vec<f32>>>,
  hits: std::sync::atomic::AtomicU64,
  misses: std::sync::atomic::AtomicU64,
}

impl CachedEmbedder {
  pub fn new(inner: Arc<dyn Embedder>) -> Self {
    Self {
      inner,
      cache: Mutex::new(HashMap::new()),
      hits: std::sync::atomic::AtomicU64::new(0),
      misses: std::sync::atomic::AtomicU64::new(0),
    }
  }

  fn cache_key(&self, text: &str) -> String {
    format!("{}:{}:{}", self.inner.provider_id(), self.inner.model_id(), text)
  }

  pub fn hit_count(&self) -> u64 {
    self.hits.load(std::sync::atomic::Ordering::Relaxed)
  }

  pub fn miss_count(&self) -> u64 {
    self.misses.load(std::sync::atomic::Ordering::Relaxed)
  }
}

#[async_trait]
impl Embedder for CachedEmbedder {
  fn provider_id(&self) -> &str {
    self.inner.provider_id()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    use std::sync::atomic::Ordering;

    let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

    // Unique texts that are not cached, in first-occurrence order.
    let mut pending: Vec<&str> = Vec::new();
    {
      let cache = self.cache.lock().await;
      for (i, text) in texts.iter().enumerate() {
        if let Some(vector) = cache.get(&self.cache_key(text)) {
          self.hits.fetch_add(1, Ordering::Relaxed);
          results[i] = Some(vector.clone());
        } else if !pending.contains(text) {
          pending.push(text);
        }
      }
    }

    if !pending.is_empty() {
      self.misses.fetch_add(pending.len() as u64, Ordering::Relaxed);
      debug!("Embedding {} unique texts ({} total requested)", pending.len(), texts.len());
      let vectors = self.inner.embed_batch(&pending).await?;
      if vectors.len() != pending.len() {
        return Err(EmbedError::Malformed(format!(
          "expected {} embeddings, got {}",
          pending.len(),
          vectors.len()
        )));
      }

      let mut cache = self.cache.lock().await;
      for (text, vector) in pending.iter().zip(vectors) {
        cache.insert(self.cache_key(text), vector);
      }
      for (i, text) in texts.iter().enumerate() {
        if results[i].is_none() {
          results[i] = cache.get(&self.cache_key(text)).cloned();
        }
      }
    }

    results
      .into_iter()
      .map(|r| r.ok_or_else(|| EmbedError::Malformed("cache fill missed a text".to_string())))
      .collect()
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    self.inner.is_available().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Counts provider calls; embeds each text as [len, 0.0].
  struct CountingEmbedder {
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
  }

  impl CountingEmbedder {
    fn new() -> Self {
      Self {
        calls: AtomicUsize::new(0),
        texts_embedded: AtomicUsize::new(0),
      }
    }
  }

  #[async_trait]
  impl Embedder for CountingEmbedder {
    fn provider_id(&self) -> &str {
      "counting"
    }
    fn model_id(&self) -> &str {
      "test"
    }
    fn dimensions(&self) -> usize {
      2
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
      Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
    }

    async fn is_available(&self) -> Result<(), EmbedError> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_dedup_within_batch() {
    let inner = Arc::new(CountingEmbedder::new());
    let cached = CachedEmbedder::new(inner.clone());

    let vectors = cached.embed_batch(&["aa", "bb", "aa", "aa"]).await.unwrap();
    assert_eq!(vectors.len(), 4);
    assert_eq!(vectors[0], vectors[2]);
    assert_eq!(vectors[0], vectors[3]);
    // Only two unique texts reached the provider.
    assert_eq!(inner.texts_embedded.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_cache_across_calls() {
    let inner = Arc::new(CountingEmbedder::new());
    let cached = CachedEmbedder::new(inner.clone());

    cached.embed_batch(&["hello"]).await.unwrap();
    cached.embed_batch(&["hello"]).await.unwrap();

    assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cached.hit_count(), 1);
    assert_eq!(cached.miss_count(), 1);
  }

  #[tokio::test]
  async fn test_order_preserved() {
    let inner = Arc::new(CountingEmbedder::new());
    let cached = CachedEmbedder::new(inner);

    let vectors = cached.embed_batch(&["a", "bbb", "cc"]).await.unwrap();
    assert_eq!(vectors[0][0], 1.0);
    assert_eq!(vectors[1][0], 3.0);
    assert_eq!(vectors[2][0], 2.0);
  }
}
