//! JSON REST API for visit reports.
//!
//! Exposes an axum [`Router`] backed by any [`ReportStore`] for reads and a
//! [`ReportMutations`] for writes, so every create and update is announced on
//! the outbound topic.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = vr_api::api_router(vr_api::AppState::new(store, publisher));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod reports;
pub mod stats;

use std::sync::Arc;

use axum::{Router, http::StatusCode, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use vr_core::{store::ReportStore, transport::Topic};
use vr_sync::{EventPublisher, ReportMutations};

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct AppState<S, T> {
  pub store:     Arc<S>,
  pub mutations: ReportMutations<S, T>,
}

impl<S, T> Clone for AppState<S, T> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), mutations: self.mutations.clone() }
  }
}

impl<S: ReportStore, T: Topic> AppState<S, T> {
  pub fn new(store: Arc<S>, publisher: Arc<EventPublisher<T>>) -> Self {
    let mutations = ReportMutations::new(store.clone(), publisher);
    Self { store, mutations }
  }
}

/// Build the API router for `state`, with permissive CORS and request
/// tracing applied.
pub fn api_router<S, T>(state: AppState<S, T>) -> Router<()>
where
  S: ReportStore + 'static,
  T: Topic + 'static,
{
  Router::new()
    .route("/", get(health))
    // Reports
    .route("/reports", get(reports::list::<S, T>).post(reports::create::<S, T>))
    .route(
      "/reports/{id}",
      get(reports::get_one::<S, T>)
        .put(reports::update::<S, T>)
        .delete(reports::delete::<S, T>),
    )
    // Statistics
    .route("/stats", get(stats::overall::<S, T>))
    .route("/stats/{contactid}", get(stats::by_contact::<S, T>))
    .route("/timeline", get(stats::timeline::<S, T>))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// `GET /`: liveness.
async fn health() -> StatusCode { StatusCode::OK }
