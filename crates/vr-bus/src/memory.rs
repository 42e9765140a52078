//! In-memory topic/subscription transport.
//!
//! A [`MemoryTopic`] fans every sent message out to all of its named
//! subscriptions. Each subscription is an unbounded queue consumed through a
//! [`MemorySubscription`]. Deliveries must be settled: completing drops the
//! message, abandoning puts it back on the queue with its delivery count
//! incremented, until `max_delivery_count` is reached and the message is moved
//! to the subscription's dead-letter list.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vr_core::transport::{Delivery, OutboundMessage, Subscription, Topic};

use crate::{BusError, Result};

/// Delivery attempts before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

// ─── Envelope ────────────────────────────────────────────────────────────────

/// A message as held by a subscription queue.
#[derive(Debug, Clone)]
pub struct Envelope {
  pub message_id:     Uuid,
  pub content_type:   String,
  pub body:           Bytes,
  pub enqueued_at:    DateTime<Utc>,
  /// Number of times the message has been handed to a receiver.
  pub delivery_count: u32,
}

// ─── Subscription state ──────────────────────────────────────────────────────

/// Settlement counters and dead letters of one subscription.
#[derive(Debug, Default)]
pub struct SubscriptionState {
  completed:    AtomicUsize,
  abandoned:    AtomicUsize,
  dead_letters: Mutex<Vec<Envelope>>,
}

impl SubscriptionState {
  /// Messages completed so far.
  pub fn completed(&self) -> usize { self.completed.load(Ordering::SeqCst) }

  /// Abandon calls so far, including those that dead-lettered the message.
  pub fn abandoned(&self) -> usize { self.abandoned.load(Ordering::SeqCst) }

  /// A copy of the dead-letter list.
  pub fn dead_letters(&self) -> Vec<Envelope> {
    self
      .dead_letters
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn dead_letter(&self, envelope: Envelope) {
    self
      .dead_letters
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(envelope);
  }
}

/// The topic-side end of a subscription.
struct SubscriptionQueue {
  sender: mpsc::UnboundedSender<Envelope>,
}

// ─── Topic ───────────────────────────────────────────────────────────────────

struct TopicInner {
  name:          String,
  closed:        AtomicBool,
  subscriptions: RwLock<HashMap<String, SubscriptionQueue>>,
}

/// An in-process topic.
///
/// Cloning is cheap: clones share the same subscriptions.
#[derive(Clone)]
pub struct MemoryTopic {
  inner: Arc<TopicInner>,
}

impl MemoryTopic {
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    info!(topic = %name, "memory topic created");
    Self {
      inner: Arc::new(TopicInner {
        name,
        closed: AtomicBool::new(false),
        subscriptions: RwLock::new(HashMap::new()),
      }),
    }
  }

  pub fn name(&self) -> &str { &self.inner.name }

  /// Create a named subscription with the default delivery limit.
  pub fn subscribe(&self, name: impl Into<String>) -> Result<MemorySubscription> {
    self.subscribe_with_limit(name, DEFAULT_MAX_DELIVERY_COUNT)
  }

  /// Create a named subscription. Only messages sent after this call reach it.
  pub fn subscribe_with_limit(
    &self,
    name: impl Into<String>,
    max_delivery_count: u32,
  ) -> Result<MemorySubscription> {
    let name = name.into();
    if self.inner.closed.load(Ordering::SeqCst) {
      return Err(BusError::Closed(self.inner.name.clone()));
    }

    let mut subscriptions = self
      .inner
      .subscriptions
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    if subscriptions.contains_key(&name) {
      return Err(BusError::DuplicateSubscription(name));
    }

    let (sender, receiver) = mpsc::unbounded_channel();
    let requeue = sender.downgrade();
    subscriptions.insert(name.clone(), SubscriptionQueue { sender });

    info!(topic = %self.inner.name, subscription = %name, "subscription created");
    Ok(MemorySubscription {
      name,
      receiver,
      requeue,
      state: Arc::new(SubscriptionState::default()),
      max_delivery_count: max_delivery_count.max(1),
    })
  }

  /// Stop accepting messages and drop every subscription queue. Receivers see
  /// the end of their subscription once their backlog is drained.
  pub fn close(&self) {
    self.inner.closed.store(true, Ordering::SeqCst);
    self
      .inner
      .subscriptions
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .clear();
    info!(topic = %self.inner.name, "memory topic closed");
  }
}

impl Topic for MemoryTopic {
  type Error = BusError;

  async fn send(&self, message: OutboundMessage) -> Result<()> {
    if self.inner.closed.load(Ordering::SeqCst) {
      return Err(BusError::Closed(self.inner.name.clone()));
    }

    let envelope = Envelope {
      message_id:     Uuid::new_v4(),
      content_type:   message.content_type,
      body:           message.body,
      enqueued_at:    Utc::now(),
      delivery_count: 0,
    };

    let subscriptions = self
      .inner
      .subscriptions
      .read()
      .unwrap_or_else(PoisonError::into_inner);
    for (name, queue) in subscriptions.iter() {
      if queue.sender.send(envelope.clone()).is_err() {
        debug!(topic = %self.inner.name, subscription = %name, "receiver dropped, message discarded");
      }
    }

    debug!(
      topic = %self.inner.name,
      message_id = %envelope.message_id,
      receivers = subscriptions.len(),
      "message sent"
    );
    Ok(())
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// The receiving end of a named subscription.
pub struct MemorySubscription {
  name:               String,
  receiver:           mpsc::UnboundedReceiver<Envelope>,
  requeue:            mpsc::WeakUnboundedSender<Envelope>,
  state:              Arc<SubscriptionState>,
  max_delivery_count: u32,
}

impl MemorySubscription {
  pub fn name(&self) -> &str { &self.name }

  /// Shared handle onto this subscription's counters and dead letters.
  pub fn state(&self) -> Arc<SubscriptionState> { self.state.clone() }
}

impl Subscription for MemorySubscription {
  type Delivery = MemoryDelivery;

  async fn next(&mut self) -> Option<MemoryDelivery> {
    let mut envelope = self.receiver.recv().await?;
    envelope.delivery_count += 1;
    Some(MemoryDelivery {
      envelope,
      requeue: self.requeue.clone(),
      state: self.state.clone(),
      max_delivery_count: self.max_delivery_count,
      settled: false,
    })
  }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

/// A message handed out by a [`MemorySubscription`], awaiting settlement.
///
/// Dropping it unsettled, for instance when its handler panics, abandons it.
pub struct MemoryDelivery {
  envelope:           Envelope,
  requeue:            mpsc::WeakUnboundedSender<Envelope>,
  state:              Arc<SubscriptionState>,
  max_delivery_count: u32,
  settled:            bool,
}

impl MemoryDelivery {
  pub fn envelope(&self) -> &Envelope { &self.envelope }

  /// Put the message back on the queue, or dead-letter it once the delivery
  /// limit is reached or the subscription is gone.
  fn release(&mut self) {
    self.settled = true;
    self.state.abandoned.fetch_add(1, Ordering::SeqCst);
    let envelope = self.envelope.clone();
    let message_id = envelope.message_id;

    if envelope.delivery_count >= self.max_delivery_count {
      warn!(
        %message_id,
        delivery_count = envelope.delivery_count,
        "delivery limit reached, message dead-lettered"
      );
      self.state.dead_letter(envelope);
      return;
    }

    match self.requeue.upgrade() {
      Some(sender) => {
        if let Err(mpsc::error::SendError(envelope)) = sender.send(envelope) {
          warn!(%message_id, "subscription closed, message dead-lettered");
          self.state.dead_letter(envelope);
        } else {
          debug!(%message_id, "message abandoned, requeued");
        }
      }
      None => {
        warn!(%message_id, "subscription closed, message dead-lettered");
        self.state.dead_letter(envelope);
      }
    }
  }
}

impl Delivery for MemoryDelivery {
  type Error = BusError;

  fn payload(&self) -> &[u8] { &self.envelope.body }

  fn delivery_count(&self) -> u32 { self.envelope.delivery_count }

  async fn complete(mut self) -> Result<()> {
    self.settled = true;
    self.state.completed.fetch_add(1, Ordering::SeqCst);
    debug!(message_id = %self.envelope.message_id, "message completed");
    Ok(())
  }

  async fn abandon(mut self) -> Result<()> {
    self.release();
    Ok(())
  }
}

impl Drop for MemoryDelivery {
  fn drop(&mut self) {
    if !self.settled {
      warn!(message_id = %self.envelope.message_id, "delivery dropped unsettled, abandoning");
      self.release();
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn msg(body: &'static str) -> OutboundMessage { OutboundMessage::json(body) }

  #[tokio::test]
  async fn send_fans_out_to_every_subscription() {
    let topic = MemoryTopic::new("scmtopic");
    let mut a = topic.subscribe("a").unwrap();
    let mut b = topic.subscribe("b").unwrap();

    topic.send(msg("{}")).await.unwrap();

    let da = a.next().await.unwrap();
    let db = b.next().await.unwrap();
    assert_eq!(da.payload(), b"{}");
    assert_eq!(db.payload(), b"{}");
    assert_eq!(da.delivery_count(), 1);
    assert_eq!(da.envelope().content_type, "application/json");
  }

  #[tokio::test]
  async fn duplicate_subscription_is_rejected() {
    let topic = MemoryTopic::new("t");
    let _a = topic.subscribe("a").unwrap();
    assert!(matches!(
      topic.subscribe("a"),
      Err(BusError::DuplicateSubscription(_))
    ));
  }

  #[tokio::test]
  async fn complete_settles_the_message() {
    let topic = MemoryTopic::new("t");
    let mut sub = topic.subscribe("s").unwrap();
    let state = sub.state();

    topic.send(msg("x")).await.unwrap();
    sub.next().await.unwrap().complete().await.unwrap();

    assert_eq!(state.completed(), 1);
    assert_eq!(state.abandoned(), 0);
    topic.close();
    assert!(sub.next().await.is_none());
  }

  #[tokio::test]
  async fn abandon_redelivers_with_incremented_count() {
    let topic = MemoryTopic::new("t");
    let mut sub = topic.subscribe("s").unwrap();

    topic.send(msg("x")).await.unwrap();
    let first = sub.next().await.unwrap();
    let id = first.envelope().message_id;
    first.abandon().await.unwrap();

    let second = sub.next().await.unwrap();
    assert_eq!(second.envelope().message_id, id);
    assert_eq!(second.delivery_count(), 2);
  }

  #[tokio::test]
  async fn dropped_delivery_is_redelivered() {
    let topic = MemoryTopic::new("t");
    let mut sub = topic.subscribe("s").unwrap();
    let state = sub.state();

    topic.send(msg("x")).await.unwrap();
    let first = sub.next().await.unwrap();
    let id = first.envelope().message_id;
    drop(first);

    let second = tokio::time::timeout(Duration::from_millis(200), sub.next())
      .await
      .expect("dropped delivery was not redelivered")
      .unwrap();
    assert_eq!(second.envelope().message_id, id);
    assert_eq!(second.delivery_count(), 2);
    assert_eq!(state.abandoned(), 1);
    second.complete().await.unwrap();
    assert_eq!(state.abandoned(), 1);
    assert_eq!(state.completed(), 1);
  }

  #[tokio::test]
  async fn abandon_past_limit_dead_letters() {
    let topic = MemoryTopic::new("t");
    let mut sub = topic.subscribe_with_limit("s", 2).unwrap();
    let state = sub.state();

    topic.send(msg("poison")).await.unwrap();
    sub.next().await.unwrap().abandon().await.unwrap();
    sub.next().await.unwrap().abandon().await.unwrap();

    let dead = state.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].delivery_count, 2);
    assert_eq!(&dead[0].body[..], b"poison");

    topic.close();
    assert!(sub.next().await.is_none());
  }

  #[tokio::test]
  async fn send_after_close_fails() {
    let topic = MemoryTopic::new("t");
    topic.close();
    assert!(matches!(topic.send(msg("x")).await, Err(BusError::Closed(_))));
    assert!(topic.subscribe("s").is_err());
  }
}
