//! Error type for `vr-bus`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
  #[error("topic {0:?} is closed")]
  Closed(String),

  #[error("subscription {0:?} already exists")]
  DuplicateSubscription(String),

  #[cfg(feature = "amqp")]
  #[error("amqp error: {0}")]
  Amqp(#[from] lapin::Error),
}

pub type Result<T, E = BusError> = std::result::Result<T, E>;
