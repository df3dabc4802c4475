//! Loading application configuration (prompts, generation limits, storage,
//! category catalogue) from TOML.
//!
//! Every section is optional; missing values fall back to `Default`.
//! See `AppConfig` for the expected schema.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Category;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationCfg,
  #[serde(default)]
  pub storage: StorageCfg,
  #[serde(default = "default_categories")]
  pub categories: Vec<Category>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      prompts: Prompts::default(),
      generation: GenerationCfg::default(),
      storage: StorageCfg::default(),
      categories: default_categories(),
    }
  }
}

/// Prompts used by the challenge generator.
///
/// Placeholders: `{category}` and `{difficulty}` in the user template,
/// `{context}` in the context template. The context line is only appended
/// when the caller supplied a non-empty context.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub challenge_system: String,
  pub challenge_user_template: String,
  pub context_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      challenge_system: "You design short real-world \"dare\" challenges that pull people out of a boredom loop. Respond ONLY with strict JSON matching the requested schema: title (string), difficulty (\"Easy\", \"Medium\" or \"Hard\"), estimatedTime (string), steps (non-empty array of strings), funFact (string).".into(),
      challenge_user_template: "Generate a fun and engaging \"dare\" challenge for the category: \"{category}\".\nAim for difficulty: {difficulty}.\nThe challenge should be actionable, exciting, and help them break their boredom loop.".into(),
      context_template: "Context specifically for this user: \"{context}\".".into(),
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GenerationCfg {
  /// Upper bound for one model call, in seconds.
  pub timeout_secs: u64,
  pub temperature: f32,
  /// Send the challenge JSON Schema as `response_format`; otherwise plain `json_object`.
  pub structured_output: bool,
}

impl Default for GenerationCfg {
  fn default() -> Self {
    Self { timeout_secs: 30, temperature: 0.9, structured_output: true }
  }
}

impl GenerationCfg {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs.max(1))
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageCfg {
  pub data_dir: PathBuf,
  /// Keep dares in memory only (nothing survives a restart).
  pub ephemeral: bool,
}

impl Default for StorageCfg {
  fn default() -> Self {
    Self { data_dir: PathBuf::from("./data"), ephemeral: false }
  }
}

pub fn default_categories() -> Vec<Category> {
  let cat = |id: &str, label: &str, description: &str| Category {
    id: id.into(),
    label: label.into(),
    description: description.into(),
  };
  vec![
    cat("tech", "Tech", "Coding, gadgets, and future tech."),
    cat("fitness", "Fitness", "Workouts, nutrition, and health."),
    cat("social", "Social", "Connect, events, and community."),
    cat("learning", "Learning", "Books, courses, and skills."),
  ]
}

impl AppConfig {
  pub fn parse(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str::<AppConfig>(s)
  }

  /// Load from DARE_CONFIG_PATH (if set), then apply env overrides.
  /// A missing or broken file is logged and replaced by defaults.
  pub fn from_env() -> Self {
    let mut cfg = load_app_config_from_env().unwrap_or_default();
    if let Ok(dir) = std::env::var("DARE_DATA_DIR") {
      cfg.storage.data_dir = PathBuf::from(dir);
    }
    cfg
  }

  /// Resolve a category request: catalogue ids map to their label, anything
  /// else is used as free text.
  pub fn resolve_category(&self, requested: &str) -> String {
    let t = requested.trim();
    self
      .categories
      .iter()
      .find(|c| c.id.eq_ignore_ascii_case(t))
      .map(|c| c.label.clone())
      .unwrap_or_else(|| t.to_string())
  }
}

/// Attempt to load `AppConfig` from DARE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("DARE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match AppConfig::parse(&s) {
      Ok(cfg) => {
        info!(target: "dare_yourself", %path, categories = cfg.categories.len(), "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "dare_yourself", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "dare_yourself", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
