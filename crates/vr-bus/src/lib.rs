//! Pub/sub transports implementing the `vr-core` transport traits.
//!
//! - [`memory`]: in-process topics with named subscriptions, settlement,
//!   redelivery and dead-lettering. Used for standalone runs and tests.
//! - `amqp` (feature `amqp`): RabbitMQ via `lapin`.

pub mod error;
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use error::{BusError, Result};
pub use memory::{Envelope, MemoryDelivery, MemorySubscription, MemoryTopic, SubscriptionState};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpDelivery, AmqpSubscription, AmqpTopic};
