//! `providers.json` - named LLM provider configurations.
//!
//! The chat clients themselves live outside this workspace; the core only
//! stores and hands out their connection settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProviderConfig {
  Anthropic {
    api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
  },
  Openai {
    api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
  },
  OpenaiCompatible {
    base_url: String,
    api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
  },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersFile {
  #[serde(default)]
  pub providers: BTreeMap<String, ProviderConfig>,
}

impl ProvidersFile {
  pub fn load(base: &Path) -> Result<Self> {
    let path = base.join("providers.json");
    if !path.exists() {
      return Ok(Self::default());
    }
    let raw = std::fs::read_to_string(&path)?;
    serde_json::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
  }

  /// Writes with owner-only permissions; the file carries API keys.
  pub fn save(&self, base: &Path) -> Result<()> {
    std::fs::create_dir_all(base)?;
    let path = base.join("providers.json");
    let raw = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
    std::fs::write(&path, raw)?;
    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
  }
}
