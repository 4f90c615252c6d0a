//! HTTP endpoint handlers. These are thin wrappers that forward to the
//! orchestrator and store, map pipeline errors to status codes, and convert
//! internal records to public DTOs.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use tracing::{info, instrument};

use crate::error::{PipelineError, StoreError};
use crate::protocol::*;
use crate::service;
use crate::state::AppState;

/// Map an escaping pipeline error to an HTTP status + JSON body.
fn error_response(e: PipelineError) -> (StatusCode, Json<ErrorOut>) {
  let status = match &e {
    PipelineError::NoContent | PipelineError::UnsupportedVariant(_) => StatusCode::BAD_REQUEST,
    PipelineError::Backend(_) => StatusCode::BAD_GATEWAY,
    PipelineError::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
    PipelineError::Store(StoreError::AssignmentNotFound(_))
    | PipelineError::Store(StoreError::VariantNotFound(_)) => StatusCode::NOT_FOUND,
    PipelineError::Store(StoreError::DuplicateVariant { .. }) => StatusCode::CONFLICT,
    PipelineError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
  };
  (status, Json(ErrorOut { message: e.to_string() }))
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state, body), fields(%body.title, subject = %body.subject))]
pub async fn http_create_assignment(
  State(state): State<Arc<AppState>>,
  Json(body): Json<CreateAssignmentIn>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorOut>)> {
  let assignment = service::create_assignment(
    &state,
    body.title,
    body.subject,
    body.original_text,
    body.source_file,
  )
  .await
  .map_err(error_response)?;
  info!(target: "pipeline", id = %assignment.id, status = ?assignment.status, "HTTP assignment created");
  let variants = state.store.variants_for(&assignment.id).await;
  let out = AssignmentDetailOut {
    assignment: to_assignment_out(&assignment),
    variants: variants
      .iter()
      .map(|v| to_variant_out(&state.settings.upload_root, v))
      .collect(),
  };
  Ok((StatusCode::CREATED, Json(out)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_assignments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let all = state.store.list_assignments().await;
  let out: Vec<AssignmentOut> = all.iter().map(to_assignment_out).collect();
  Json(out)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_assignment(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorOut>)> {
  let assignment = state
    .store
    .get_assignment(&id)
    .await
    .ok_or_else(|| error_response(StoreError::AssignmentNotFound(id.clone()).into()))?;
  let variants = state.store.variants_for(&id).await;
  let out = AssignmentDetailOut {
    assignment: to_assignment_out(&assignment),
    variants: variants
      .iter()
      .map(|v| to_variant_out(&state.settings.upload_root, v))
      .collect(),
  };
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_assignment(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorOut>)> {
  state
    .store
    .delete_assignment(&id)
    .await
    .map_err(|e| error_response(e.into()))?;
  info!(target: "pipeline", %id, "HTTP assignment deleted");
  Ok(StatusCode::NO_CONTENT)
}

#[instrument(level = "info", skip(state, body), fields(%id, variant_type = %body.variant_type, difficulty = %body.difficulty))]
pub async fn http_regenerate_variant(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<RegenerateIn>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorOut>)> {
  let variant = service::regenerate_variant(&state, &id, body.variant_type, body.difficulty)
    .await
    .map_err(error_response)?;
  info!(target: "pipeline", %id, variant_id = %variant.id, "HTTP variant regenerated");
  Ok(Json(to_variant_out(&state.settings.upload_root, &variant)))
}
