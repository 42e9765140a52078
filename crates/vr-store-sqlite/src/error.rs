//! Error type for `vr-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("report not found: {partition}/{id}")]
  NotFound { partition: String, id: String },

  #[error("report already exists: {partition}/{id}")]
  AlreadyExists { partition: String, id: String },

  /// The document's `type` does not match the partition it is written to.
  #[error("document type {found:?} does not match partition {expected:?}")]
  PartitionMismatch { expected: String, found: String },

  #[error("document id {found:?} does not match target id {expected:?}")]
  IdMismatch { expected: String, found: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
