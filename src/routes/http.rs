//! HTTP endpoint handlers. These are thin wrappers that forward to the catalog,
//! the session store and the paragraph generator.

use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json, response::IntoResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::paragraph::{highlight, ParagraphStatus};
use crate::protocol::*;
use crate::routes::extract::{ApiJson, ApiPath};
use crate::session::SessionAction;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_get_days(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.catalog.days())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_day(
  State(state): State<Arc<AppState>>,
  ApiPath(day): ApiPath<u32>,
) -> impl IntoResponse {
  let entries: Vec<_> = state.catalog.entries_for_day(day).iter().map(|e| (**e).clone()).collect();
  info!(target: "onestep", day, words = entries.len(), "HTTP day served");
  Json(DayOut { day, skill: state.catalog.skill_for_day(day), empty: entries.is_empty(), entries })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_word(
  State(state): State<Arc<AppState>>,
  ApiPath(word): ApiPath<String>,
) -> Result<impl IntoResponse, ApiError> {
  let entry = state
    .catalog
    .lookup_by_word(&word)
    .ok_or_else(|| ApiError::not_found(format!("unknown word: {}", word)))?;
  Ok(Json((*entry).clone()))
}

#[instrument(level = "info")]
pub async fn http_get_parts_of_speech() -> impl IntoResponse {
  Json(parts_of_speech_out())
}

#[instrument(level = "info", skip(state, body), fields(day = body.day, mode = ?body.mode))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  ApiJson(body): ApiJson<StartSessionIn>,
) -> Result<impl IntoResponse, ApiError> {
  let (id, session) = state.start_session(body.day, body.mode).await?;
  Ok((StatusCode::CREATED, Json(session_out(id, &session))))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let session = state.get_session(id).await?;
  Ok(Json(session_out(id, &session)))
}

#[instrument(level = "info", skip(state, action), fields(%id, action = action.name()))]
pub async fn http_post_session_action(
  State(state): State<Arc<AppState>>,
  ApiPath(id): ApiPath<Uuid>,
  ApiJson(action): ApiJson<SessionAction>,
) -> Result<impl IntoResponse, ApiError> {
  let session = state.apply_action(id, action).await?;
  Ok(Json(session_out(id, &session)))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  if state.end_session(id).await {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::not_found(format!("unknown session: {}", id)))
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_paragraph_prompt(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(state.paragraphs.build_prompt())
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_paragraph(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let status = state.paragraphs.status().await;
  Json(render_paragraph(&state, &status, false))
}

/// Initiates a generation and waits for it. A response whose generation was
/// superseded meanwhile carries the newer state and `superseded: true`.
#[instrument(level = "info", skip(state))]
pub async fn http_post_paragraph_generate(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let outcome = state.paragraphs.regenerate().await;
  info!(target: "onestep", landed = outcome.landed, "HTTP paragraph generation served");
  Json(render_paragraph(&state, &outcome.status, !outcome.landed))
}

fn render_paragraph(state: &AppState, status: &ParagraphStatus, superseded: bool) -> ParagraphOut {
  let segments = match status {
    ParagraphStatus::Ready(text) => highlight(text, state.paragraphs.index()).iter().map(SegmentOut::from).collect(),
    _ => Vec::new(),
  };
  paragraph_out(status, segments, superseded)
}
