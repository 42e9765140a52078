//! Handlers for the sentiment statistics endpoints.
//!
//! Only reports with a recorded result are counted. Every endpoint returns a
//! JSON array, which is empty when nothing qualifies.

use axum::{
  Json,
  extract::{Path, State},
};
use vr_core::{
  RECORD_TYPE,
  stats::{ContactStats, OverallStats, TimelineEntry},
  store::ReportStore,
  transport::Topic,
};

use crate::{AppState, error::ApiError};

/// `GET /stats`
pub async fn overall<S, T>(
  State(state): State<AppState<S, T>>,
) -> Result<Json<Vec<OverallStats>>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let stats = state
    .store
    .stats_overall(RECORD_TYPE)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats.into_iter().collect()))
}

/// `GET /stats/{contactid}`
pub async fn by_contact<S, T>(
  State(state): State<AppState<S, T>>,
  Path(contact_id): Path<String>,
) -> Result<Json<Vec<ContactStats>>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let stats = state
    .store
    .stats_by_contact(RECORD_TYPE, &contact_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}

/// `GET /timeline`
pub async fn timeline<S, T>(
  State(state): State<AppState<S, T>>,
) -> Result<Json<Vec<TimelineEntry>>, ApiError>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  let entries = state
    .store
    .timeline(RECORD_TYPE)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}
