//! Handlers for `/reports` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/reports` | Optional `?contactid=`; returns list items |
//! | `POST`   | `/reports` | Body: [`NewVisitReport`]; returns 201 + view |
//! | `GET`    | `/reports/{id}` | Single report view |
//! | `PUT`    | `/reports/{id}` | Body: [`VisitReportUpdate`]; returns the updated view |
//! | `DELETE` | `/reports/{id}` | 200, or 404 when nothing was removed |

use axum::{
  Json,
  extract::{Path, Query, State, rejection::JsonRejection},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use vr_core::{
  RECORD_TYPE,
  report::{NewVisitReport, VisitReportListItem, VisitReportUpdate, VisitReportView},
  store::ReportStore,
  transport::Topic,
};

use crate::{AppState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Restrict to reports embedding this contact. Empty means no filter.
  #[serde(default)]
  pub contactid: String,
}

/// `GET /reports[?contactid=<id>]`
pub async fn list<S, T>(
  State(state): State<AppState<S, T>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<VisitReportListItem>>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let reports = if params.contactid.is_empty() {
    state.store.list(RECORD_TYPE).await
  } else {
    state
      .store
      .query_by_contact_id(RECORD_TYPE, &params.contactid)
      .await
  }
  .map_err(ApiError::store)?;

  Ok(Json(reports.iter().map(|r| r.list_item()).collect()))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /reports/{id}`
pub async fn get_one<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<String>,
) -> Result<Json<VisitReportView>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let report = state
    .store
    .get(RECORD_TYPE, &id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("report {id} not found")))?;
  Ok(Json(report.view()))
}

// ─── Mutations ────────────────────────────────────────────────────────────────

/// `POST /reports`: returns 201 + the stored view.
pub async fn create<S, T>(
  State(state): State<AppState<S, T>>,
  body: Result<Json<NewVisitReport>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let Json(input) = body?;
  let view = state.mutations.create(input).await?;
  Ok((StatusCode::CREATED, Json(view)))
}

/// `PUT /reports/{id}`
pub async fn update<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<String>,
  body: Result<Json<VisitReportUpdate>, JsonRejection>,
) -> Result<Json<VisitReportView>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let Json(input) = body?;
  let view = state.mutations.update(&id, input).await?;
  Ok(Json(view))
}

/// `DELETE /reports/{id}`
pub async fn delete<S, T>(
  State(state): State<AppState<S, T>>,
  Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  state.mutations.delete(&id).await?;
  Ok(StatusCode::OK)
}
