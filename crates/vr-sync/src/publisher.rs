//! [`EventPublisher`]: sends domain events to the outbound topic.
//!
//! Delivery is at-most-once: a failed or timed-out send is reported to the
//! caller and never retried here.

use std::time::Duration;

use tracing::debug;
use vr_core::{
  event::DomainEvent,
  transport::{OutboundMessage, Topic},
};

use crate::PublishError;

/// How long a single send may take before it counts as failed.
pub const DEFAULT_PUBLISH_DEADLINE: Duration = Duration::from_secs(10);

pub struct EventPublisher<T> {
  topic:    T,
  deadline: Duration,
}

impl<T: Topic> EventPublisher<T> {
  pub fn new(topic: T) -> Self {
    Self { topic, deadline: DEFAULT_PUBLISH_DEADLINE }
  }

  pub fn with_deadline(mut self, deadline: Duration) -> Self {
    self.deadline = deadline;
    self
  }

  pub fn topic(&self) -> &T { &self.topic }

  /// Serialise `event` as JSON and send it under the configured deadline.
  pub async fn publish(&self, event: &DomainEvent) -> Result<(), PublishError> {
    let body = serde_json::to_vec(event)?;
    let message = OutboundMessage::json(body);

    match tokio::time::timeout(self.deadline, self.topic.send(message)).await {
      Ok(Ok(())) => {
        debug!(
          report_id = %event.report.id,
          event_type = ?event.event_type,
          "domain event published"
        );
        Ok(())
      }
      Ok(Err(e)) => Err(PublishError::Send(Box::new(e))),
      Err(_) => Err(PublishError::DeadlineExceeded(self.deadline)),
    }
  }
}
