use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("Invalid configuration: {0}")]
  Config(String),

  #[error("Storage: {0}")]
  Storage(String),

  #[error("Validation: {0}")]
  Validation(String),

  #[error("Not found: {entity} '{id}'")]
  NotFound { entity: &'static str, id: String },

  #[error("Provider: {0}")]
  Provider(String),

  #[error("Dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Project '{0}' is already indexed")]
  AlreadyIndexed(String),

  #[error("Operation cancelled")]
  Cancelled,

  #[error(transparent)]
  Eval(#[from] EvalError),

  #[error("IO: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EvalError {
  #[error("Dataset not found: {0}")]
  DatasetNotFound(String),

  #[error("Invalid dataset: {0}")]
  DatasetInvalid(String),

  #[error("Eval run failed: {0}")]
  RunFailed(String),
}

impl Error {
  /// One actionable sentence shown alongside the message, when we have one.
  pub fn hint(&self) -> Option<&'static str> {
    match self {
      Error::Config(_) => Some("Run 'ctx config list' to inspect the current configuration."),
      Error::AlreadyIndexed(_) => Some("Pass --force to replace the existing index."),
      Error::DimensionMismatch { .. } => {
        Some("The project was indexed with a different embedding model; re-index with --force.")
      }
      Error::Provider(_) => Some("Check that the embedding provider is running and reachable."),
      Error::Eval(EvalError::DatasetNotFound(_)) => Some("Place a golden dataset at eval/<project>.json."),
      Error::NotFound { entity: "project", .. } => Some("Run 'ctx list' to see indexed projects."),
      _ => None,
    }
  }

  /// Process exit code for the CLI boundary.
  pub fn exit_code(&self) -> i32 {
    match self {
      Error::Validation(_) | Error::Eval(EvalError::DatasetInvalid(_)) => 2,
      Error::NotFound { .. } | Error::Eval(EvalError::DatasetNotFound(_)) => 3,
      Error::DimensionMismatch { .. } => 4,
      _ => 1,
    }
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_codes() {
    assert_eq!(Error::Validation("bad".into()).exit_code(), 2);
    assert_eq!(
      Error::NotFound {
        entity: "project",
        id: "x".into()
      }
      .exit_code(),
      3
    );
    assert_eq!(Error::DimensionMismatch { expected: 768, actual: 384 }.exit_code(), 4);
    assert_eq!(Error::Storage("corrupt".into()).exit_code(), 1);
    assert_eq!(Error::Cancelled.exit_code(), 1);
  }

  #[test]
  fn test_hints() {
    assert!(Error::AlreadyIndexed("api".into()).hint().unwrap().contains("--force"));
    assert!(Error::Storage("x".into()).hint().is_none());
  }
}
