//! AMQP (RabbitMQ) transport.
//!
//! A topic maps to a durable topic exchange; a subscription maps to a durable
//! queue bound to that exchange with the `#` routing pattern. Completing a
//! delivery acks it, abandoning nacks it with `requeue = true`. Dead-lettering
//! is left to the broker's queue policy.

use std::sync::Arc;

use futures::StreamExt as _;
use lapin::{
  BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
  options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
  },
  types::FieldTable,
};
use tracing::{debug, error, info};
use vr_core::transport::{Delivery, OutboundMessage, Subscription, Topic};

use crate::Result;

/// Persistent delivery mode for published messages.
const PERSISTENT: u8 = 2;

async fn open_channel(url: &str, exchange: &str) -> Result<(Arc<Connection>, Channel)> {
  let connection = Connection::connect(url, ConnectionProperties::default()).await?;
  let channel = connection.create_channel().await?;

  channel
    .exchange_declare(
      exchange,
      ExchangeKind::Topic,
      ExchangeDeclareOptions { durable: true, ..Default::default() },
      FieldTable::default(),
    )
    .await?;

  Ok((Arc::new(connection), channel))
}

// ─── Topic ───────────────────────────────────────────────────────────────────

/// Publishes to a topic exchange.
pub struct AmqpTopic {
  _connection: Arc<Connection>,
  channel:     Channel,
  exchange:    String,
}

impl AmqpTopic {
  pub async fn connect(url: &str, exchange: impl Into<String>) -> Result<Self> {
    let exchange = exchange.into();
    let (connection, channel) = open_channel(url, &exchange).await?;
    info!(%exchange, "amqp topic connected");
    Ok(Self { _connection: connection, channel, exchange })
  }
}

impl Topic for AmqpTopic {
  type Error = crate::BusError;

  async fn send(&self, message: OutboundMessage) -> Result<()> {
    let properties = BasicProperties::default()
      .with_content_type(message.content_type.clone().into())
      .with_delivery_mode(PERSISTENT);

    self
      .channel
      .basic_publish(
        &self.exchange,
        "",
        BasicPublishOptions::default(),
        &message.body[..],
        properties,
      )
      .await?
      .await?;

    debug!(exchange = %self.exchange, bytes = message.body.len(), "message published");
    Ok(())
  }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// Consumes a durable queue bound to a topic exchange.
pub struct AmqpSubscription {
  _connection: Arc<Connection>,
  consumer:    Consumer,
  queue:       String,
}

impl AmqpSubscription {
  /// Declare and bind `queue` to `exchange`, then start consuming with at
  /// most `prefetch` unsettled deliveries outstanding.
  pub async fn connect(
    url: &str,
    exchange: &str,
    queue: impl Into<String>,
    prefetch: u16,
  ) -> Result<Self> {
    let queue = queue.into();
    let (connection, channel) = open_channel(url, exchange).await?;

    channel
      .queue_declare(
        &queue,
        QueueDeclareOptions { durable: true, ..Default::default() },
        FieldTable::default(),
      )
      .await?;
    channel
      .queue_bind(&queue, exchange, "#", QueueBindOptions::default(), FieldTable::default())
      .await?;
    channel.basic_qos(prefetch, BasicQosOptions::default()).await?;

    let consumer = channel
      .basic_consume(
        &queue,
        &format!("{queue}-consumer"),
        BasicConsumeOptions::default(),
        FieldTable::default(),
      )
      .await?;

    info!(%exchange, %queue, prefetch, "amqp subscription connected");
    Ok(Self { _connection: connection, consumer, queue })
  }
}

impl Subscription for AmqpSubscription {
  type Delivery = AmqpDelivery;

  async fn next(&mut self) -> Option<AmqpDelivery> {
    match self.consumer.next().await? {
      Ok(inner) => Some(AmqpDelivery { inner }),
      Err(e) => {
        error!(queue = %self.queue, error = %e, "consumer stream failed");
        None
      }
    }
  }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

pub struct AmqpDelivery {
  inner: lapin::message::Delivery,
}

impl Delivery for AmqpDelivery {
  type Error = crate::BusError;

  fn payload(&self) -> &[u8] { &self.inner.data }

  /// AMQP only reports whether a message was delivered before, so any
  /// redelivery is reported as the second attempt.
  fn delivery_count(&self) -> u32 {
    if self.inner.redelivered { 2 } else { 1 }
  }

  async fn complete(self) -> Result<()> {
    self.inner.ack(BasicAckOptions::default()).await?;
    Ok(())
  }

  async fn abandon(self) -> Result<()> {
    self
      .inner
      .nack(BasicNackOptions { requeue: true, ..Default::default() })
      .await?;
    Ok(())
  }
}
