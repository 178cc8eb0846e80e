//! Application configuration: optional TOML file plus environment overrides.
//!
//! Schema (every table and key optional):
//!
//! ```toml
//! [vocabulary]
//! path = "Database/vocabulary_data.xml"
//!
//! [generation]
//! base_url = "https://router.huggingface.co/v1"
//! model = "moonshotai/Kimi-K2-Instruct-0905"
//! temperature = 0.9
//! max_tokens = 220
//! timeout_secs = 60
//! system_prompt = "..."
//! user_prompt_template = "... {day_lines}"
//!
//! [proxy]
//! upstream_url = "https://router.huggingface.co/v1/chat/completions"
//!
//! [sessions]
//! idle_ttl_secs = 7200
//! max_sessions = 1024
//! ```
//!
//! The upstream credential is never read from the file, only from `HF_TOKEN`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse config file: {0}")]
  Toml(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
  pub vocabulary: VocabularyCfg,
  pub generation: GenerationCfg,
  pub proxy: ProxyCfg,
  pub sessions: SessionCfg,
  /// Bearer credential for the upstream API (`HF_TOKEN`).
  #[serde(skip)]
  pub credential: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VocabularyCfg {
  pub path: PathBuf,
}

impl Default for VocabularyCfg {
  fn default() -> Self {
    Self { path: PathBuf::from("Database/vocabulary_data.xml") }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationCfg {
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Absent means the transport's own defaults apply.
  pub timeout_secs: Option<u64>,
  pub system_prompt: String,
  /// `{day_lines}` is replaced with one `Day-NN: w1, w2` line per day.
  pub user_prompt_template: String,
}

impl Default for GenerationCfg {
  fn default() -> Self {
    Self {
      base_url: "https://router.huggingface.co/v1".into(),
      model: "moonshotai/Kimi-K2-Instruct-0905".into(),
      temperature: 0.9,
      max_tokens: 220,
      timeout_secs: None,
      system_prompt: "Respond with only the requested paragraphs. Do not include analysis, reasoning, labels, or extra text.".into(),
      user_prompt_template: "Write one natural, contextual paragraph per day in this order. Each paragraph must use only that day's words exactly once and keep the same word casing. Return only the paragraphs in order, separated by a blank line. Do not add labels or analysis. Words by day:\n{day_lines}".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ProxyCfg {
  pub upstream_url: String,
}

impl Default for ProxyCfg {
  fn default() -> Self {
    Self { upstream_url: "https://router.huggingface.co/v1/chat/completions".into() }
  }
}

/// Bounds on the in-memory session store. Sessions untouched for longer
/// than `idle_ttl_secs` are swept; past `max_sessions` the least recently
/// touched one is evicted.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionCfg {
  pub idle_ttl_secs: u64,
  pub max_sessions: usize,
}

impl Default for SessionCfg {
  fn default() -> Self {
    Self { idle_ttl_secs: 2 * 60 * 60, max_sessions: 1024 }
  }
}

impl AppConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str::<AppConfig>(s)?)
  }

  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let s = std::fs::read_to_string(path)?;
    Self::from_toml_str(&s)
  }

  /// Apply overrides from an environment lookup. Split out so tests need not touch the process env.
  pub fn apply_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(path) = var("VOCABULARY_PATH") {
      self.vocabulary.path = PathBuf::from(path);
    }
    if let Some(url) = var("GENERATION_BASE_URL") {
      self.generation.base_url = url;
    }
    if let Some(model) = var("GENERATION_MODEL") {
      self.generation.model = model;
    }
    if let Some(raw) = var("GENERATION_TIMEOUT_SECS") {
      match raw.parse::<u64>() {
        Ok(secs) => self.generation.timeout_secs = Some(secs),
        Err(e) => warn!(target: "onestep", %raw, error = %e, "Ignoring invalid GENERATION_TIMEOUT_SECS"),
      }
    }
    self.credential = var("HF_TOKEN")
      .map(|t| t.trim().to_string())
      .filter(|t| !t.is_empty());
    self
  }
}

/// Load from ONESTEP_CONFIG_PATH (if set), then apply env overrides.
/// A broken file is logged and replaced by defaults.
pub fn load_app_config_from_env() -> AppConfig {
  let base = match std::env::var("ONESTEP_CONFIG_PATH") {
    Ok(path) => match AppConfig::from_file(Path::new(&path)) {
      Ok(cfg) => {
        info!(target: "onestep", %path, "Loaded app config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "onestep", %path, error = %e, "Failed to load config; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };
  base.apply_env(|key| std::env::var(key).ok())
}
