//! Loading service configuration (engine tuning + optional question bank)
//! from TOML.
//!
//! See `AppConfig`, `EngineConfig` and `QuestionCfg` for the expected schema.

use serde::Deserialize;
use tracing::{error, info};

/// Timing and scoring knobs for the session engine. These are deliberately
/// configuration rather than constants so tests can run on compressed time
/// scales.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
  #[serde(default = "default_total_questions")]
  pub total_questions: usize,
  #[serde(default = "default_test_duration_secs")]
  pub test_duration_secs: u64,
  #[serde(default = "default_subscription_days")]
  pub subscription_days: i64,
  #[serde(default = "default_correct_reward")]
  pub correct_reward: f64,
  /// Subtracted from the score on a wrong answer.
  #[serde(default = "default_wrong_penalty")]
  pub wrong_penalty: f64,
}

fn default_total_questions() -> usize { 20 }
fn default_test_duration_secs() -> u64 { 15 * 60 }
fn default_subscription_days() -> i64 { 28 }
fn default_correct_reward() -> f64 { 1.0 }
fn default_wrong_penalty() -> f64 { 1.0 / 3.0 }

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      total_questions: default_total_questions(),
      test_duration_secs: default_test_duration_secs(),
      subscription_days: default_subscription_days(),
      correct_reward: default_correct_reward(),
      wrong_penalty: default_wrong_penalty(),
    }
  }
}

impl EngineConfig {
  pub fn test_duration(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.test_duration_secs as i64)
  }

  pub fn subscription_validity(&self) -> chrono::Duration {
    chrono::Duration::days(self.subscription_days)
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub questions: Vec<QuestionCfg>,
}

/// Question entry accepted in TOML configuration. Validation (option count,
/// correct label membership) happens when the bank is built.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionCfg {
  #[serde(default)] pub id: Option<String>,
  pub prompt: String,
  pub options: Vec<String>,
  pub correct: String,
}

/// Attempt to load `AppConfig` from QUIZ_CONFIG_PATH. On any parsing/IO
/// error, returns None and the caller falls back to defaults.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("QUIZ_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizpass_backend", %path, "Loaded service config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizpass_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizpass_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
