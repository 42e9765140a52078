//! Test doubles shared by the unit tests in this crate.

use std::{
  collections::HashSet,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use thiserror::Error;
use vr_core::{
  RECORD_TYPE,
  contact::{ContactChange, ContactSnapshot},
  report::VisitReport,
  stats::{ContactStats, OverallStats, TimelineEntry},
  store::ReportStore,
  transport::{Delivery, OutboundMessage, Topic},
};
use vr_store_sqlite::SqliteStore;

use crate::Settlement;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TestError(pub String);

impl TestError {
  fn from_display(e: impl std::fmt::Display) -> Self { Self(e.to_string()) }
}

pub fn report(id: &str, contact_id: &str) -> VisitReport {
  VisitReport {
    id:                           id.into(),
    record_type:                  RECORD_TYPE.into(),
    detected_language:            String::new(),
    subject:                      format!("Visit {id}"),
    description:                  String::new(),
    visit_date:                   "2024-03-01".into(),
    result:                       String::new(),
    visit_result_sentiment_score: 0.0,
    visit_result_key_phrases:     vec![],
    contact:                      ContactSnapshot::with_id(contact_id),
  }
}

pub fn change(id: &str, firstname: &str, company: &str) -> ContactChange {
  ContactChange {
    id:              id.into(),
    firstname:       firstname.into(),
    lastname:        String::new(),
    avatar_location: String::new(),
    company:         company.into(),
  }
}

// ─── Topic ───────────────────────────────────────────────────────────────────

/// Records every sent message; can be told to fail or stall.
#[derive(Default)]
pub struct RecordingTopic {
  sent:  Mutex<Vec<OutboundMessage>>,
  fail:  AtomicBool,
  delay: Option<Duration>,
}

impl RecordingTopic {
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn fail_sends(&self, fail: bool) { self.fail.store(fail, Ordering::SeqCst); }

  pub fn sent(&self) -> Vec<OutboundMessage> {
    self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl Topic for RecordingTopic {
  type Error = TestError;

  async fn send(&self, message: OutboundMessage) -> Result<(), TestError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.fail.load(Ordering::SeqCst) {
      return Err(TestError("topic unavailable".into()));
    }
    self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(message);
    Ok(())
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An in-memory [`SqliteStore`] with injectable failures, a call counter and
/// replace concurrency tracking.
pub struct FlakyStore {
  inner:             SqliteStore,
  failing_replace:   Mutex<HashSet<String>>,
  panicking_replace: Mutex<HashSet<String>>,
  fail_query:        AtomicBool,
  calls:             AtomicUsize,
  replace_delay:     Option<Duration>,
  in_flight:         AtomicUsize,
  peak:              AtomicUsize,
}

impl FlakyStore {
  pub async fn new() -> Self {
    Self {
      inner:             SqliteStore::open_in_memory().await.expect("in-memory store"),
      failing_replace:   Mutex::new(HashSet::new()),
      panicking_replace: Mutex::new(HashSet::new()),
      fail_query:        AtomicBool::new(false),
      calls:             AtomicUsize::new(0),
      replace_delay:     None,
      in_flight:         AtomicUsize::new(0),
      peak:              AtomicUsize::new(0),
    }
  }

  pub fn with_replace_delay(mut self, delay: Duration) -> Self {
    self.replace_delay = Some(delay);
    self
  }

  /// The wrapped store; calls through it are not counted.
  pub fn inner(&self) -> &SqliteStore { &self.inner }

  pub async fn seed(&self, report: &VisitReport) {
    self.inner.create(RECORD_TYPE, report).await.expect("seed report");
  }

  pub fn fail_replace_for(&self, id: &str) {
    self
      .failing_replace
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id.to_owned());
  }

  /// Make `replace` panic for `id`.
  pub fn panic_replace_for(&self, id: &str) {
    self
      .panicking_replace
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(id.to_owned());
  }

  pub fn fail_queries(&self) { self.fail_query.store(true, Ordering::SeqCst); }

  pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

  pub fn peak_in_flight(&self) -> usize { self.peak.load(Ordering::SeqCst) }

  fn count(&self) { self.calls.fetch_add(1, Ordering::SeqCst); }

  fn replace_fails(&self, id: &str) -> bool {
    self
      .failing_replace
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(id)
  }

  fn query_fails(&self) -> Result<(), TestError> {
    if self.fail_query.load(Ordering::SeqCst) {
      return Err(TestError("query unavailable".into()));
    }
    Ok(())
  }
}

impl ReportStore for FlakyStore {
  type Error = TestError;

  async fn get(&self, partition: &str, id: &str) -> Result<Option<VisitReport>, TestError> {
    self.count();
    self.inner.get(partition, id).await.map_err(TestError::from_display)
  }

  async fn create(&self, partition: &str, report: &VisitReport) -> Result<(), TestError> {
    self.count();
    self.inner.create(partition, report).await.map_err(TestError::from_display)
  }

  async fn replace(&self, partition: &str, id: &str, report: &VisitReport) -> Result<(), TestError> {
    self.count();
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);

    if let Some(delay) = self.replace_delay {
      tokio::time::sleep(delay).await;
    }
    let panics = self
      .panicking_replace
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .contains(id);
    if panics {
      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      panic!("injected replace panic for {id}");
    }
    let result = if self.replace_fails(id) {
      Err(TestError(format!("injected replace failure for {id}")))
    } else {
      self
        .inner
        .replace(partition, id, report)
        .await
        .map_err(TestError::from_display)
    };

    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    result
  }

  async fn delete(&self, partition: &str, id: &str) -> Result<bool, TestError> {
    self.count();
    self.inner.delete(partition, id).await.map_err(TestError::from_display)
  }

  async fn list(&self, partition: &str) -> Result<Vec<VisitReport>, TestError> {
    self.count();
    self.query_fails()?;
    self.inner.list(partition).await.map_err(TestError::from_display)
  }

  async fn query_by_contact_id(
    &self,
    partition: &str,
    contact_id: &str,
  ) -> Result<Vec<VisitReport>, TestError> {
    self.count();
    self.query_fails()?;
    self
      .inner
      .query_by_contact_id(partition, contact_id)
      .await
      .map_err(TestError::from_display)
  }

  async fn stats_overall(&self, partition: &str) -> Result<Option<OverallStats>, TestError> {
    self.count();
    self.inner.stats_overall(partition).await.map_err(TestError::from_display)
  }

  async fn stats_by_contact(
    &self,
    partition: &str,
    contact_id: &str,
  ) -> Result<Vec<ContactStats>, TestError> {
    self.count();
    self
      .inner
      .stats_by_contact(partition, contact_id)
      .await
      .map_err(TestError::from_display)
  }

  async fn timeline(&self, partition: &str) -> Result<Vec<TimelineEntry>, TestError> {
    self.count();
    self.inner.timeline(partition).await.map_err(TestError::from_display)
  }
}

// ─── Delivery ────────────────────────────────────────────────────────────────

/// Observes how a [`TestDelivery`] was settled.
#[derive(Clone, Default)]
pub struct Settled(Arc<Mutex<Option<Settlement>>>);

impl Settled {
  pub fn get(&self) -> Option<Settlement> {
    *self.0.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set(&self, settlement: Settlement) {
    *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(settlement);
  }
}

pub struct TestDelivery {
  payload: Vec<u8>,
  settled: Settled,
}

impl TestDelivery {
  pub fn new(payload: &[u8]) -> (Self, Settled) {
    let settled = Settled::default();
    (Self { payload: payload.to_vec(), settled: settled.clone() }, settled)
  }
}

impl Delivery for TestDelivery {
  type Error = TestError;

  fn payload(&self) -> &[u8] { &self.payload }

  fn delivery_count(&self) -> u32 { 1 }

  async fn complete(self) -> Result<(), TestError> {
    self.settled.set(Settlement::Completed);
    Ok(())
  }

  async fn abandon(self) -> Result<(), TestError> {
    self.settled.set(Settlement::Abandoned);
    Ok(())
  }
}
