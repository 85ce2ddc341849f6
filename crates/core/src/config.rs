//! Typed configuration loaded from `<ctx dir>/config.toml`.
//!
//! Environment variables override file values for keys and hosts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Root directory for all on-disk state.
///
/// Respects the following (in order of precedence):
/// 1. CTX_DIR - explicit override
/// 2. <home>/.ctx - platform default
pub fn ctx_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("CTX_DIR") {
    return PathBuf::from(dir);
  }
  dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".ctx")
}

pub fn db_path(base: &Path) -> PathBuf {
  base.join("data").join("context.db")
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn eval_dir(base: &Path) -> PathBuf {
  base.join("eval")
}

pub fn exports_dir(base: &Path) -> PathBuf {
  base.join("exports")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
  Anthropic,
  Openai,
  Ollama,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
  Huggingface,
  Ollama,
  Openai,
}

impl EmbeddingProviderKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EmbeddingProviderKind::Huggingface => "huggingface",
      EmbeddingProviderKind::Ollama => "ollama",
      EmbeddingProviderKind::Openai => "openai",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  pub default_provider: LlmProviderKind,
  pub default_model: String,
  pub embedding: EmbeddingConfig,
  pub search: SearchConfig,
  pub eval: EvalConfig,
  pub observability: ObservabilityConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      default_provider: LlmProviderKind::Anthropic,
      default_model: "claude-sonnet-4-5".to_string(),
      embedding: EmbeddingConfig::default(),
      search: SearchConfig::default(),
      eval: EvalConfig::default(),
      observability: ObservabilityConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
  pub provider: EmbeddingProviderKind,
  pub model: String,
  pub fallback_provider: Option<EmbeddingProviderKind>,
  pub fallback_model: Option<String>,
  pub batch_size: usize,
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      provider: EmbeddingProviderKind::Ollama,
      model: "nomic-embed-text".to_string(),
      fallback_provider: None,
      fallback_model: None,
      batch_size: 32,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub top_k: usize,
  pub rerank: bool,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self { top_k: 10, rerank: true }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
  pub golden_path: String,
  pub default_k: usize,
  pub thresholds: EvalThresholds,
}

impl Default for EvalConfig {
  fn default() -> Self {
    Self {
      golden_path: "eval".to_string(),
      default_k: 5,
      thresholds: EvalThresholds::default(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalThresholds {
  pub mrr: f64,
  pub hit_rate: f64,
  pub precision_at_k: f64,
}

impl Default for EvalThresholds {
  fn default() -> Self {
    Self {
      mrr: 0.5,
      hit_rate: 0.7,
      precision_at_k: 0.3,
    }
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
  pub enabled: bool,
  pub sample_rate: f32,
  pub langfuse_host: Option<String>,
  pub langfuse_public_key: Option<String>,
  pub langfuse_secret_key: Option<String>,
}

impl Config {
  /// Load from `<base>/config.toml`, falling back to defaults if absent.
  /// Applies environment overrides, then validates.
  pub fn load(base: &Path) -> Result<Self> {
    let path = config_path(base);
    let mut config = if path.exists() {
      let raw = std::fs::read_to_string(&path)?;
      toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
    } else {
      Config::default()
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
  }

  /// Environment variables win over file values for keys and hosts.
  fn apply_env_overrides(&mut self) {
    if let Ok(host) = std::env::var("LANGFUSE_HOST") {
      self.observability.langfuse_host = Some(host);
    }
    if let Ok(key) = std::env::var("LANGFUSE_PUBLIC_KEY") {
      self.observability.langfuse_public_key = Some(key);
    }
    if let Ok(key) = std::env::var("LANGFUSE_SECRET_KEY") {
      self.observability.langfuse_secret_key = Some(key);
    }
  }

  /// Fail fast on out-of-range values before any work happens.
  pub fn validate(&self) -> Result<()> {
    if !(1..=100).contains(&self.search.top_k) {
      return Err(Error::Validation(format!(
        "search.top_k must be in [1, 100], got {}",
        self.search.top_k
      )));
    }
    if self.embedding.batch_size == 0 {
      return Err(Error::Validation("embedding.batch_size must be >= 1".to_string()));
    }
    if self.eval.default_k == 0 {
      return Err(Error::Validation("eval.default_k must be >= 1".to_string()));
    }
    for (name, value) in [
      ("eval.thresholds.mrr", self.eval.thresholds.mrr),
      ("eval.thresholds.hit_rate", self.eval.thresholds.hit_rate),
      ("eval.thresholds.precision_at_k", self.eval.thresholds.precision_at_k),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(Error::Validation(format!("{name} must be in [0, 1], got {value}")));
      }
    }
    if !(0.0..=1.0).contains(&self.observability.sample_rate) {
      return Err(Error::Validation(format!(
        "observability.sample_rate must be in [0, 1], got {}",
        self.observability.sample_rate
      )));
    }
    if self.embedding.fallback_provider.is_some() != self.embedding.fallback_model.is_some() {
      return Err(Error::Validation(
        "embedding.fallback_provider and embedding.fallback_model must be set together".to_string(),
      ));
    }
    Ok(())
  }

  pub fn save(&self, base: &Path) -> Result<()> {
    let path = config_path(base);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(&path, raw)?;
    Ok(())
  }

  /// Read a value by dotted key, e.g. `search.top_k`.
  pub fn get_value(&self, key: &str) -> Result<toml::Value> {
    let table = toml::Value::try_from(self).map_err(|e| Error::Config(e.to_string()))?;
    let mut current = &table;
    for part in key.split('.') {
      current = current.get(part).ok_or_else(|| Error::NotFound {
        entity: "config key",
        id: key.to_string(),
      })?;
    }
    Ok(current.clone())
  }

  /// Set a value by dotted key, re-validating the result.
  pub fn set_value(&mut self, key: &str, raw: &str) -> Result<()> {
    let mut table = toml::Value::try_from(&*self).map_err(|e| Error::Config(e.to_string()))?;
    let parsed = parse_scalar(raw);

    let mut current = &mut table;
    let parts: Vec<&str> = key.split('.').collect();
    for part in &parts[..parts.len() - 1] {
      current = current.get_mut(*part).ok_or_else(|| Error::NotFound {
        entity: "config key",
        id: key.to_string(),
      })?;
    }
    let last = parts[parts.len() - 1];
    let target = current.get_mut(last).ok_or_else(|| Error::NotFound {
      entity: "config key",
      id: key.to_string(),
    })?;
    *target = parsed;

    let updated: Config = table
      .try_into()
      .map_err(|e| Error::Validation(format!("invalid value for {key}: {e}")))?;
    updated.validate()?;
    *self = updated;
    Ok(())
  }
}

/// Interpret a CLI-supplied value as a TOML scalar; anything unparseable is
/// taken as a plain string.
fn parse_scalar(raw: &str) -> toml::Value {
  if let Ok(table) = format!("value = {raw}").parse::<toml::Table>()
    && let Some(value) = table.get("value")
  {
    return value.clone();
  }
  toml::Value::String(raw.to_string())
}
