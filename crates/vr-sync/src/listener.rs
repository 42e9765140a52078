//! The contact-change listener.
//!
//! Each delivery carries the full current state of one contact. Handling it
//! means finding every report that embeds the contact, rewriting their
//! snapshots through the [`FanOutUpdater`], and then settling the delivery.
//!
//! Settlement rules:
//!
//! | outcome                          | `BestEffort` | `AbandonOnFailure` |
//! |----------------------------------|--------------|--------------------|
//! | payload does not decode          | abandon      | abandon            |
//! | report query fails               | complete     | abandon            |
//! | no report embeds the contact     | complete     | complete           |
//! | every replace succeeded          | complete     | complete           |
//! | at least one replace failed      | complete     | abandon            |

use std::{future::Future, sync::Arc};

use serde::Deserialize;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};
use vr_core::{
  RECORD_TYPE,
  contact::ContactChange,
  store::ReportStore,
  transport::{Delivery, Subscription},
};

use crate::fanout::{DEFAULT_MAX_WORKERS, FanOutUpdater};

/// What to do with a delivery whose processing partly failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
  /// Log the failure and complete the delivery anyway.
  #[default]
  BestEffort,
  /// Abandon the delivery so the transport redelivers it.
  AbandonOnFailure,
}

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
  Completed,
  Abandoned,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
  pub ack_policy:     AckPolicy,
  /// Deliveries handled concurrently by [`ContactChangeListener::run`].
  pub max_in_flight:  usize,
  /// Concurrent replaces within one delivery.
  pub fanout_workers: usize,
}

impl Default for ListenerConfig {
  fn default() -> Self {
    Self {
      ack_policy:     AckPolicy::default(),
      max_in_flight:  4,
      fanout_workers: DEFAULT_MAX_WORKERS,
    }
  }
}

pub struct ContactChangeListener<S> {
  store:  Arc<S>,
  fanout: FanOutUpdater<S>,
  config: ListenerConfig,
}

impl<S: ReportStore + 'static> ContactChangeListener<S> {
  pub fn new(store: Arc<S>, config: ListenerConfig) -> Self {
    let fanout = FanOutUpdater::new(store.clone()).with_max_workers(config.fanout_workers);
    Self { store, fanout, config }
  }

  pub fn config(&self) -> &ListenerConfig { &self.config }

  /// Process one delivery to completion and settle it.
  ///
  /// The returned [`Settlement`] is the one that was requested of the
  /// transport; a failure to settle is logged, not returned.
  pub async fn handle<D: Delivery>(&self, delivery: D) -> Settlement {
    let change = match ContactChange::decode(delivery.payload()) {
      Ok(change) => change,
      Err(e) => {
        warn!(
          delivery_count = delivery.delivery_count(),
          error = %e,
          "undecodable contact change"
        );
        return settle(delivery, Settlement::Abandoned).await;
      }
    };

    let reports = match self.store.query_by_contact_id(RECORD_TYPE, &change.id).await {
      Ok(reports) => reports,
      Err(e) => {
        error!(contact_id = %change.id, error = %e, "failed to query reports for contact");
        return settle(delivery, self.on_failure()).await;
      }
    };

    if reports.is_empty() {
      debug!(contact_id = %change.id, "no visit reports reference contact");
      return settle(delivery, Settlement::Completed).await;
    }

    let matched = reports.len();
    let outcome = self.fanout.apply(reports, &change).await;
    info!(
      contact_id = %change.id,
      matched,
      updated = outcome.succeeded,
      failed = outcome.failures.len(),
      "contact change applied"
    );

    let settlement = if outcome.is_complete() {
      Settlement::Completed
    } else {
      self.on_failure()
    };
    settle(delivery, settlement).await
  }

  /// Receive and handle deliveries until `shutdown` resolves or the
  /// subscription closes, with at most `max_in_flight` handled at once.
  /// Deliveries already being handled are finished before returning.
  pub async fn run<Sub, F>(self: Arc<Self>, mut subscription: Sub, shutdown: F)
  where
    Sub: Subscription,
    F: Future<Output = ()> + Send,
  {
    let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);

    info!(
      max_in_flight = self.config.max_in_flight,
      ack_policy = ?self.config.ack_policy,
      "contact change listener started"
    );

    loop {
      let permit = tokio::select! {
        _ = &mut shutdown => break,
        permit = permits.clone().acquire_owned() => match permit {
          Ok(permit) => permit,
          Err(_) => break,
        },
      };

      let delivery = tokio::select! {
        _ = &mut shutdown => break,
        next = subscription.next() => match next {
          Some(delivery) => delivery,
          None => {
            info!("subscription closed");
            break;
          }
        },
      };

      let listener = self.clone();
      tasks.spawn(async move {
        let _permit = permit;
        listener.handle(delivery).await
      });

      while let Some(joined) = tasks.try_join_next() {
        log_join(joined);
      }
    }

    debug!(in_flight = tasks.len(), "draining in-flight deliveries");
    while let Some(joined) = tasks.join_next().await {
      log_join(joined);
    }
    info!("contact change listener stopped");
  }

  fn on_failure(&self) -> Settlement {
    match self.config.ack_policy {
      AckPolicy::BestEffort => Settlement::Completed,
      AckPolicy::AbandonOnFailure => Settlement::Abandoned,
    }
  }
}

async fn settle<D: Delivery>(delivery: D, settlement: Settlement) -> Settlement {
  let result = match settlement {
    Settlement::Completed => delivery.complete().await,
    Settlement::Abandoned => delivery.abandon().await,
  };
  if let Err(e) = result {
    error!(?settlement, error = %e, "failed to settle delivery");
  }
  settlement
}

fn log_join(joined: Result<Settlement, tokio::task::JoinError>) {
  if let Err(e) = joined {
    error!(error = %e, "delivery handler aborted");
  }
}
