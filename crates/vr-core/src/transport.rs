//! Publish/subscribe transport contracts.
//!
//! Concrete transports live in `vr-bus`. Delivery is at-least-once: a message
//! that is abandoned, or whose handler crashes before completing it, will be
//! delivered again.

use std::future::Future;

use bytes::Bytes;

/// Content type attached to every JSON message this service sends.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A message ready to be sent to a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
  pub content_type: String,
  pub body:         Bytes,
}

impl OutboundMessage {
  pub fn json(body: impl Into<Bytes>) -> Self {
    Self { content_type: JSON_CONTENT_TYPE.to_owned(), body: body.into() }
  }
}

/// A named outbound topic.
pub trait Topic: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Send one message. Returns once the transport has accepted it.
  fn send(
    &self,
    message: OutboundMessage,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

/// A single received message awaiting settlement.
///
/// Settling consumes the handle, so a message is either completed or
/// abandoned, never both.
pub trait Delivery: Send + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The raw message body.
  fn payload(&self) -> &[u8];

  /// How many times this message has been handed out, starting at 1.
  fn delivery_count(&self) -> u32;

  /// Remove the message from the subscription.
  fn complete(self) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Release the message for redelivery (or dead-lettering, per the
  /// transport's policy).
  fn abandon(self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A long-lived subscription yielding deliveries one at a time.
pub trait Subscription: Send + 'static {
  type Delivery: Delivery;

  /// Wait for the next delivery. `None` means the subscription is closed.
  fn next(&mut self) -> impl Future<Output = Option<Self::Delivery>> + Send + '_;
}
