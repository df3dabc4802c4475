//! HTTP endpoint handlers. These are thin wrappers that forward to `AppState`.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{error, info, instrument};

use crate::domain::{DareId, Difficulty};
use crate::error::{CommandError, GenerationError, StoreError, TransportError};
use crate::protocol::*;
use crate::state::AppState;

/// Error type for HTTP handlers; renders as `{ "error", "code" }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Command(#[from] CommandError),

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("Bad request: {0}")]
  BadRequest(String),
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn store_error_status(e: &StoreError) -> (StatusCode, &'static str) {
  match e {
    StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
    StoreError::NotLoaded => (StatusCode::SERVICE_UNAVAILABLE, "NOT_LOADED"),
    StoreError::Persistence { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILED"),
    StoreError::Unreadable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNREADABLE"),
    StoreError::IdsExhausted { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IDS_EXHAUSTED"),
  }
}

pub fn generation_error_status(e: &GenerationError) -> StatusCode {
  match e {
    GenerationError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    GenerationError::Validation(_) => StatusCode::BAD_GATEWAY,
    GenerationError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
    GenerationError::Transport(TransportError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
    GenerationError::Transport(_) => StatusCode::BAD_GATEWAY,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Store(e) | ApiError::Command(CommandError::Store(e)) => {
        let (status, code) = store_error_status(e);
        if status.is_server_error() {
          error!(target: "dare_yourself", error = %e, "Store failure");
        }
        (status, ErrorBody::new(code, e.to_string()))
      }
      ApiError::Command(CommandError::NoPreview) => (StatusCode::CONFLICT, ErrorBody::new("NO_PREVIEW", self.to_string())),
      ApiError::Transport(e) => {
        let e = GenerationError::Transport(e.clone());
        (generation_error_status(&e), generation_error_body(&e))
      }
      ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorBody::new("BAD_REQUEST", msg.clone())),
    };
    (status, Json(body)).into_response()
  }
}

pub fn parse_difficulty(raw: Option<&str>) -> Result<Difficulty, ApiError> {
  match raw {
    None => Ok(Difficulty::default()),
    Some(s) if s.trim().is_empty() => Ok(Difficulty::default()),
    Some(s) => s.parse::<Difficulty>().map_err(ApiError::BadRequest),
  }
}

fn parse_id(raw: &str) -> Result<DareId, ApiError> {
  raw.parse::<DareId>().map_err(|e| ApiError::BadRequest(format!("invalid dare id '{raw}': {e}")))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    store_loaded: state.store_loaded().await,
    generation_enabled: state.generator.is_some(),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_categories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(CategoriesOut { categories: state.categories().to_vec() })
}

#[instrument(level = "info", skip(state), fields(contains = ?q.contains))]
pub async fn http_get_models(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ModelsQuery>,
) -> ApiResult<ModelsOut> {
  let oa = state.openai.as_ref().ok_or(TransportError::NotConfigured)?;
  let models = oa.list_models(q.contains.as_deref()).await?;
  info!(target: "dare_yourself", count = models.len(), "HTTP models listed");
  Ok(Json(ModelsOut { models }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(to_view_out(state.snapshot().await))
}

/// Runs the generation to completion. Failures of the generation itself are
/// reported with the failure view and a non-2xx status.
#[instrument(level = "info", skip(state, body), fields(category = %body.category, context_len = body.context.len()))]
pub async fn http_post_generate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<Response, ApiError> {
  let difficulty = parse_difficulty(body.difficulty.as_deref())?;
  let report = state.request_generation(&body.category, &body.context, difficulty).await;
  info!(target: "generation", ticket = report.ticket, applied = report.applied, ok = report.result.is_ok(), "HTTP generation finished");

  let status = match &report.result {
    Ok(_) => StatusCode::OK,
    Err(e) => generation_error_status(e),
  };
  let generation = match report.result {
    Ok(challenge) => GenerationOut::Success { ticket: report.ticket, challenge },
    Err(error) => GenerationOut::Failure { ticket: report.ticket, error: generation_error_body(&error) },
  };
  Ok((status, Json(GenerateOut { applied: report.applied, generation })).into_response())
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_accept_preview(State(state): State<Arc<AppState>>) -> ApiResult<DareOut> {
  let dare = state.accept_preview().await?;
  info!(target: "dares", id = %dare.id, "HTTP preview accepted");
  Ok(Json(DareOut { dare }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  state.reset().await;
  Json(to_generation_out(&state.generation().await))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_complete(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ApiResult<DareOut> {
  let dare = state.complete_dare(parse_id(&id)?).await?;
  Ok(Json(DareOut { dare }))
}

#[instrument(level = "info", skip(state), fields(%id, origin = %q.origin))]
pub async fn http_delete_dare(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Query(q): Query<DeleteQuery>,
) -> ApiResult<DareOut> {
  let dare = state.delete_dare(parse_id(&id)?, q.origin).await?;
  Ok(Json(DareOut { dare }))
}
