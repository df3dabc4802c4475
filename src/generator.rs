//! Challenge generation: prompt composition, one bounded model call, schema validation.
//!
//! There is no retry, caching, or queuing here. One request, one outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::config::{GenerationCfg, Prompts};
use crate::domain::{Challenge, Difficulty};
use crate::error::{GenerationError, TransportError};
use crate::schema::{challenge_json_schema, validate_challenge_text};
use crate::util::{fill_template, trunc_for_log};

/// The remote generation call. Implementations return the raw text of the
/// model's answer; validation happens in the generator.
#[async_trait]
pub trait ChallengeModel: Send + Sync {
  fn model_name(&self) -> &str;

  async fn complete_json(&self, system: &str, user: &str, schema: Option<&Value>) -> Result<String, TransportError>;
}

#[derive(Clone)]
pub struct ChallengeGenerator {
  model: Arc<dyn ChallengeModel>,
  prompts: Prompts,
  timeout: Duration,
  structured_output: bool,
}

impl ChallengeGenerator {
  pub fn new(model: Arc<dyn ChallengeModel>, prompts: Prompts, cfg: &GenerationCfg) -> Self {
    Self { model, prompts, timeout: cfg.timeout(), structured_output: cfg.structured_output }
  }

  /// Build the user prompt. An empty context adds no personalization line.
  pub fn compose_prompt(&self, category: &str, user_context: &str, difficulty: Difficulty) -> String {
    let mut prompt = fill_template(
      &self.prompts.challenge_user_template,
      &[("category", category), ("difficulty", difficulty.as_str())],
    );
    let context = user_context.trim();
    if !context.is_empty() {
      prompt.push('\n');
      prompt.push_str(&fill_template(&self.prompts.context_template, &[("context", context)]));
    }
    prompt
  }

  /// Generate one challenge. The difficulty is a hint; the model's returned
  /// difficulty is authoritative once it passes validation.
  #[instrument(
    level = "info",
    skip(self, category, user_context, difficulty),
    fields(%category, %difficulty, context_len = user_context.len(), model = %self.model.model_name())
  )]
  pub async fn generate(
    &self,
    category: &str,
    user_context: &str,
    difficulty: Difficulty,
  ) -> Result<Challenge, GenerationError> {
    let category = category.trim();
    if category.is_empty() {
      return Err(GenerationError::InvalidRequest("category must not be empty".into()));
    }

    let user = self.compose_prompt(category, user_context, difficulty);
    let schema = self.structured_output.then(challenge_json_schema);
    info!(target: "generation", %category, %difficulty, context_len = user_context.trim().len(), model = %self.model.model_name(), "Generation attempt started");

    let start = Instant::now();
    let call = self.model.complete_json(&self.prompts.challenge_system, &user, schema.as_ref());
    let result = match tokio::time::timeout(self.timeout, call).await {
      Ok(r) => r,
      Err(_) => Err(TransportError::Timeout(self.timeout)),
    };
    let elapsed = start.elapsed();

    let text = match result {
      Ok(t) => t,
      Err(e) => {
        error!(target: "generation", ?elapsed, error = %e, "Model call failed during challenge generation");
        return Err(e.into());
      }
    };

    match validate_challenge_text(&text) {
      Ok(ch) => {
        if ch.difficulty != difficulty {
          debug!(target: "generation", requested = %difficulty, returned = %ch.difficulty, "Model chose a different difficulty; keeping the model's");
        }
        info!(target: "generation", ?elapsed, title = %trunc_for_log(&ch.title, 60), steps = ch.steps.len(), "Challenge generated");
        Ok(ch)
      }
      Err(e) => {
        error!(target: "generation", ?elapsed, violations = e.violations.len(), error = %e, preview = %trunc_for_log(&text, 80), "Model output failed schema validation");
        Err(e.into())
      }
    }
  }
}
