use async_trait::async_trait;

/// A batch embedding back end. Implementations are interchangeable as long as
/// `dimensions()` agree; consumers must never mix vectors across differing
/// dimensions.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Short provider identifier, e.g. "ollama".
  fn provider_id(&self) -> &str;
  fn model_id(&self) -> &str;
  /// Fixed per instance.
  fn dimensions(&self) -> usize;

  /// One vector per input text, in order.
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
    let mut vectors = self.embed_batch(&[text]).await?;
    vectors
      .pop()
      .ok_or_else(|| EmbedError::Malformed("provider returned an empty batch".to_string()))
  }

  async fn is_available(&self) -> Result<(), EmbedError>;
}

/// What went wrong talking to an embedding back end.
///
/// The split matters downstream: `retryable()` decides what the retry layer
/// re-attempts, and dimension violations must surface as the project-contract
/// error rather than a generic provider failure.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
  #[error("cannot reach embedding provider '{provider}': {detail}")]
  Unreachable { provider: String, detail: String },

  #[error("embedding server answered {status}: {detail}")]
  Http { status: u16, detail: String },

  #[error("embedding response was malformed: {0}")]
  Malformed(String),

  #[error("embedding call exceeded its deadline")]
  DeadlineExceeded,

  #[error("embedding provider disabled after repeated failures")]
  Tripped,

  #[error("expected {expected}-dimensional embeddings, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
  /// Transient faults are worth another attempt; contract violations and
  /// client-side mistakes are not.
  pub fn retryable(&self) -> bool {
    match self {
      EmbedError::Unreachable { .. } | EmbedError::DeadlineExceeded => true,
      EmbedError::Http { status, .. } => *status == 429 || *status >= 500,
      EmbedError::Malformed(_) | EmbedError::Tripped | EmbedError::DimensionMismatch { .. } => false,
    }
  }

  pub(crate) fn http(status: reqwest::StatusCode, detail: impl Into<String>) -> Self {
    EmbedError::Http {
      status: status.as_u16(),
      detail: detail.into(),
    }
  }

  /// Classify a transport error from a named provider.
  pub(crate) fn transport(provider: &str, error: reqwest::Error) -> Self {
    if error.is_timeout() {
      EmbedError::DeadlineExceeded
    } else if error.is_connect() || error.is_request() {
      EmbedError::Unreachable {
        provider: provider.to_string(),
        detail: error.to_string(),
      }
    } else if error.is_decode() {
      EmbedError::Malformed(error.to_string())
    } else {
      EmbedError::Unreachable {
        provider: provider.to_string(),
        detail: error.to_string(),
      }
    }
  }
}

impl From<EmbedError> for ctx_core::Error {
  fn from(e: EmbedError) -> Self {
    match e {
      EmbedError::DimensionMismatch { expected, actual } => ctx_core::Error::DimensionMismatch { expected, actual },
      other => ctx_core::Error::Provider(other.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable_classification() {
    assert!(
      EmbedError::Unreachable {
        provider: "ollama".to_string(),
        detail: "connection refused".to_string()
      }
      .retryable()
    );
    assert!(EmbedError::DeadlineExceeded.retryable());
    assert!(EmbedError::Http { status: 429, detail: String::new() }.retryable());
    assert!(EmbedError::Http { status: 503, detail: String::new() }.retryable());

    assert!(!EmbedError::Http { status: 400, detail: String::new() }.retryable());
    assert!(!EmbedError::Http { status: 401, detail: String::new() }.retryable());
    assert!(!EmbedError::Malformed("truncated".to_string()).retryable());
    assert!(!EmbedError::Tripped.retryable());
    assert!(!EmbedError::DimensionMismatch { expected: 768, actual: 4 }.retryable());
  }

  #[test]
  fn test_dimension_mismatch_crosses_into_core_error() {
    let core: ctx_core::Error = EmbedError::DimensionMismatch { expected: 768, actual: 384 }.into();
    assert!(matches!(core, ctx_core::Error::DimensionMismatch { expected: 768, actual: 384 }));
    assert_eq!(core.exit_code(), 4);
  }

  #[test]
  fn test_other_errors_become_provider_kind() {
    let core: ctx_core::Error = EmbedError::Http {
      status: 500,
      detail: "boom".to_string(),
    }
    .into();
    assert!(matches!(core, ctx_core::Error::Provider(_)));
  }
}
