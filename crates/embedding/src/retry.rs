//! Retry layer for embedding batches.
//!
//! Transient faults (see `EmbedError::retryable`) are re-attempted with
//! capped exponential backoff and full jitter. Deadlines scale with batch
//! size, and a trip latch stops hammering a provider once several batches in
//! a row have burned through all their attempts.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::provider::{EmbedError, Embedder};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Total tries per batch, including the first.
  pub attempts: u32,
  /// Backoff before the second try; doubles per try up to `max_delay`.
  pub base_delay: Duration,
  pub max_delay: Duration,
  /// Deadline floor for any call.
  pub call_timeout: Duration,
  /// Extra deadline granted per text in the batch.
  pub per_item: Duration,
  /// Consecutive batches that may exhaust their attempts before the latch
  /// trips and further calls fail fast. 0 disables the latch.
  pub trip_after: u32,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::remote()
  }
}

impl RetryPolicy {
  /// Local services answer fast or not at all.
  pub fn local() -> Self {
    Self {
      attempts: 3,
      base_delay: Duration::from_millis(250),
      max_delay: Duration::from_secs(4),
      call_timeout: Duration::from_secs(10),
      per_item: Duration::from_millis(500),
      trip_after: 4,
    }
  }

  /// Cloud APIs rate-limit; back off longer and tolerate more.
  pub fn remote() -> Self {
    Self {
      attempts: 5,
      base_delay: Duration::from_millis(800),
      max_delay: Duration::from_secs(45),
      call_timeout: Duration::from_secs(30),
      per_item: Duration::from_secs(1),
      trip_after: 6,
    }
  }

  /// Deadline for one call, scaled to the batch it carries.
  pub fn deadline_for(&self, batch_len: usize) -> Duration {
    self
      .call_timeout
      .saturating_add(self.per_item.saturating_mul(batch_len.min(4096) as u32))
  }

  /// Backoff slept after try number `tried` failed: the doubled-and-capped
  /// window, drawn uniformly from its upper half.
  pub fn backoff_after(&self, tried: u32) -> Duration {
    let doublings = tried.saturating_sub(1).min(16);
    let window = self
      .base_delay
      .saturating_mul(1u32 << doublings)
      .min(self.max_delay);
    let half = window / 2;
    half + jitter_within(window - half)
  }
}

/// Uniform draw in [0, range] from a process-wide splitmix64 sequence.
fn jitter_within(range: Duration) -> Duration {
  static SEQUENCE: AtomicU64 = AtomicU64::new(0x6a09_e667_f3bc_c908);
  let mut z = SEQUENCE.fetch_add(0x9e37_79b9_7f4a_7c15, Ordering::Relaxed);
  z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
  z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
  z ^= z >> 31;
  let unit = (z >> 11) as f64 / (1u64 << 53) as f64;
  range.mul_f64(unit)
}

/// Wraps a provider with the retry policy. Contract violations (dimensions,
/// malformed responses) are never retried.
pub struct RetryingEmbedder<P: Embedder> {
  inner: P,
  policy: RetryPolicy,
  /// Consecutive batches that exhausted every attempt.
  strikes: AtomicU32,
}

impl<P: Embedder> RetryingEmbedder<P> {
  pub fn new(inner: P) -> Self {
    Self::with_policy(inner, RetryPolicy::default())
  }

  pub fn with_policy(inner: P, policy: RetryPolicy) -> Self {
    Self {
      inner,
      policy,
      strikes: AtomicU32::new(0),
    }
  }

  fn tripped(&self) -> bool {
    self.policy.trip_after > 0 && self.strikes.load(Ordering::Relaxed) >= self.policy.trip_after
  }

  fn record_exhausted(&self) {
    self.strikes.fetch_add(1, Ordering::Relaxed);
  }

  fn record_success(&self) {
    self.strikes.store(0, Ordering::Relaxed);
  }

  async fn try_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
    let deadline = self.policy.deadline_for(texts.len());
    let attempts = self.policy.attempts.max(1);
    let mut tried = 0u32;

    loop {
      tried += 1;
      let outcome = tokio::time::timeout(deadline, self.inner.embed_batch(texts)).await;
      let error = match outcome {
        Ok(Ok(vectors)) => {
          self.record_success();
          return Ok(vectors);
        }
        Ok(Err(e)) => e,
        Err(_) => EmbedError::DeadlineExceeded,
      };

      if !error.retryable() {
        return Err(error);
      }
      if tried >= attempts {
        self.record_exhausted();
        return Err(error);
      }

      let pause = self.policy.backoff_after(tried);
      warn!(
        batch = texts.len(),
        tried,
        "Embedding batch failed ({error}), retrying in {pause:?}"
      );
      tokio::time::sleep(pause).await;
    }
  }
}

#[async_trait]
impl<P: Embedder> Embedder for RetryingEmbedder<P> {
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
    if self.tripped() {
      debug!("Embedding provider latch is open; failing fast");
      return Err(EmbedError::Tripped);
    }
    self.try_batch(texts).await
  }

  async fn is_available(&self) -> Result<(), EmbedError> {
    if self.tripped() {
      return Err(EmbedError::Tripped);
    }
    let result = self.inner.is_available().await;
    if result.is_ok() {
      self.record_success();
    }
    result
  }
}
