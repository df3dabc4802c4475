//! Minimal OpenAI-compatible client for our use-cases.
//!
//! We only call `chat/completions` (requesting a JSON object, optionally with a
//! strict JSON Schema) and `models`. The same wire format is served by OpenAI
//! and by Google's Gemini OpenAI-compatible endpoint, so both providers work.
//! Calls are instrumented and log model names, latencies, and response sizes (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to avoid PII leaks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::TransportError;
use crate::generator::ChallengeModel;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub temperature: f32,
  pub timeout: Duration,
}

impl OpenAI {
  /// Construct the client from env. OPENAI_API_KEY wins; otherwise
  /// GOOGLE_GENERATIVE_AI_API_KEY selects the Gemini endpoint. None if neither is set.
  pub fn from_env(temperature: f32, timeout: Duration) -> Option<Self> {
    let (api_key, default_base, default_model) = match std::env::var("OPENAI_API_KEY") {
      Ok(k) if !k.trim().is_empty() => (k, OPENAI_BASE_URL, OPENAI_DEFAULT_MODEL),
      _ => {
        let k = std::env::var("GOOGLE_GENERATIVE_AI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        (k, GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL)
      }
    };
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| default_base.into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| default_model.into());
    Self::new(api_key, base_url, model, temperature, timeout).ok()
  }

  pub fn new(
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
  ) -> Result<Self, TransportError> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TransportError::Network(e.to_string()))?;
    let base_url = base_url.trim_end_matches('/').to_string();
    Ok(Self { client, api_key, base_url, model, temperature, timeout })
  }

  fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
      TransportError::Timeout(self.timeout)
    } else {
      TransportError::Network(e.to_string())
    }
  }

  async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    if res.status().is_success() {
      return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let message = extract_openai_error(&body).unwrap_or(body);
    Err(TransportError::Http { status: status.as_u16(), message })
  }

  /// JSON-object chat completion. Returns the raw message content; the caller
  /// decides what a valid payload looks like.
  #[instrument(level = "info", skip(self, system, user, schema), fields(model = %self.model, structured = schema.is_some()))]
  async fn chat_json(&self, system: &str, user: &str, schema: Option<&Value>) -> Result<String, TransportError> {
    let url = format!("{}/chat/completions", self.base_url);
    let response_format = match schema {
      Some(s) => ResponseFormat::JsonSchema {
        json_schema: JsonSchemaFormat { name: "challenge".into(), strict: true, schema: s.clone() },
      },
      None => ResponseFormat::JsonObject,
    };
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      response_format: Some(response_format),
      max_tokens: None,
    };

    let res = self.client.post(&url)
      .header(USER_AGENT, "dare-yourself-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| self.map_reqwest(e))?;
    let res = Self::check_status(res).await?;

    let body: ChatCompletionResponse = res.json().await
      .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "Provider usage");
    }
    let text = body.choices.into_iter().next()
      .and_then(|c| c.message.content)
      .ok_or_else(|| TransportError::MalformedResponse("response has no message content".into()))?;
    debug!(content_len = text.len(), "Chat completion content received");
    Ok(text)
  }

  /// List model ids offered by the provider, optionally keeping only ids containing `contains`.
  #[instrument(level = "info", skip(self), fields(base_url = %self.base_url))]
  pub async fn list_models(&self, contains: Option<&str>) -> Result<Vec<String>, TransportError> {
    let url = format!("{}/models", self.base_url);
    let res = self.client.get(&url)
      .header(USER_AGENT, "dare-yourself-backend/0.1")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .send().await.map_err(|e| self.map_reqwest(e))?;
    let res = Self::check_status(res).await?;
    let body: ModelList = res.json().await
      .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
    Ok(filter_model_ids(body, contains))
  }
}

#[async_trait]
impl ChallengeModel for OpenAI {
  fn model_name(&self) -> &str {
    &self.model
  }

  async fn complete_json(&self, system: &str, user: &str, schema: Option<&Value>) -> Result<String, TransportError> {
    self.chat_json(system, user, schema).await
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<ResponseFormat>,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
  JsonObject,
  JsonSchema { json_schema: JsonSchemaFormat },
}
#[derive(Serialize)]
struct JsonSchemaFormat { name: String, strict: bool, schema: Value }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ModelList { #[serde(default)] data: Vec<ModelEntry> }
#[derive(Deserialize)]
struct ModelEntry { id: String }

fn filter_model_ids(list: ModelList, contains: Option<&str>) -> Vec<String> {
  let mut ids: Vec<String> = list.data.into_iter()
    .map(|m| m.id)
    .filter(|id| contains.map_or(true, |needle| id.contains(needle)))
    .collect();
  ids.sort();
  ids
}

/// Try to extract a clean error message from an OpenAI-style error body.
/// Gemini wraps errors in a one-element array, so accept both shapes.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  if let Ok(w) = serde_json::from_str::<EWrap>(body) {
    return Some(w.error.message);
  }
  serde_json::from_str::<Vec<EWrap>>(body).ok()?.into_iter().next().map(|w| w.error.message)
}
