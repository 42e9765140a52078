//! Error types for `vr-sync`.

use std::time::Duration;

use thiserror::Error;

/// Why an event could not be published.
#[derive(Debug, Error)]
pub enum PublishError {
  #[error("failed to serialise event: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to send event: {0}")]
  Send(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("send did not complete within {0:?}")]
  DeadlineExceeded(Duration),
}

/// Why a create/update/delete was refused or failed.
#[derive(Debug, Error)]
pub enum MutationError {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("report not found: {0}")]
  NotFound(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MutationError {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl From<vr_core::Error> for MutationError {
  fn from(e: vr_core::Error) -> Self {
    match e {
      vr_core::Error::Validation(msg) => Self::Validation(msg),
      other => Self::Validation(other.to_string()),
    }
  }
}
